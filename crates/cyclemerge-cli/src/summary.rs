use console::Style;
use cyclemerge_core::pipeline::config::RegistrationConfig;
use cyclemerge_core::pipeline::RegistrationOutput;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_registration_summary(config: &RegistrationConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Cycle Registration"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(18)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(config.input.dir.join(&config.input.pattern).display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output.path.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Reference"),
        s.value.apply_to(format!("cycle {}", config.input.reference_index))
    );
    println!();

    let a = &config.alignment;
    println!("  {}", s.header.apply_to("Alignment"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Channels"),
        s.value.apply_to(format!(
            "ref {} / moving {}",
            a.reference_channel, a.moving_channel
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Level"),
        s.value.apply_to(a.level)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Thumbnail"),
        s.value.apply_to(format!("{} px", a.thumbnail_size))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Blocks"),
        s.value.apply_to(format!("{} px", a.block_size))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("On failure"),
        s.method.apply_to(a.on_failure)
    );
    println!();

    println!("  {}", s.header.apply_to("Selection"));
    match config.selection.channels {
        Some(ref channels) => println!(
            "    {:<14}{}",
            s.label.apply_to("Channels"),
            s.value.apply_to(channels)
        ),
        None => println!(
            "    {:<14}{}",
            s.label.apply_to("Channels"),
            s.disabled.apply_to("all")
        ),
    }
    println!(
        "    {:<14}{}",
        s.label.apply_to("Duplicates"),
        s.method.apply_to(config.selection.duplicates)
    );
    println!();

    println!("  {}", s.header.apply_to("Pyramid"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Compression"),
        s.method.apply_to(config.output.compression)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Tile"),
        s.value.apply_to(format!("{0}x{0}", config.output.tile_size))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Levels"),
        s.value.apply_to(format!(
            "up to {}, min edge {} px",
            config.pyramid.max_levels, config.pyramid.min_level_size
        ))
    );
    println!();
}

pub fn print_result_summary(output: &RegistrationOutput) {
    let s = Styles::new();

    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Size"),
        s.value.apply_to(format!(
            "{}x{} {}",
            output.width, output.height, output.pixel_type
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Pixel size"),
        s.value.apply_to(format!(
            "{} x {} {}",
            output.calibration.pixel_size_x,
            output.calibration.pixel_size_y,
            output.calibration.unit
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Levels"),
        s.value.apply_to(output.levels.len())
    );
    if output.skipped_cycles.is_empty() {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Skipped"),
            s.disabled.apply_to("none")
        );
    } else {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Skipped"),
            s.value.apply_to(format!("{:?}", output.skipped_cycles))
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Channels"));
    for channel in output.channel_map.iter() {
        println!(
            "    {:<4}{:<24}{}",
            s.label.apply_to(channel.output_index),
            s.value.apply_to(&channel.name),
            s.label.apply_to(format!(
                "cycle {} channel {}",
                channel.cycle, channel.source_channel
            ))
        );
    }
    println!();
    println!(
        "  Output saved to {}",
        s.path.apply_to(output.path.display())
    );
}
