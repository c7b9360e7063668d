//! Minimal OME-XML support: read the pixel size of an input cycle and
//! describe the registered output stack.

use std::fmt::Write as _;

use crate::cycle::{CalibrationMetadata, LengthUnit, PixelType};

/// Value of `name="..."` inside the first `<element ...>` start tag.
fn element_attribute<'a>(xml: &'a str, element: &str, name: &str) -> Option<&'a str> {
    let open = format!("<{}", element);
    let mut search = 0;
    let start = loop {
        let pos = search + xml[search..].find(&open)?;
        let after = xml[pos + open.len()..].chars().next()?;
        if after.is_whitespace() || after == '>' || after == '/' {
            break pos;
        }
        search = pos + open.len();
    };
    let end = start + xml[start..].find('>')?;
    let tag = &xml[start..end];

    let mut rest = tag;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim_end();
        let key = key.rsplit(char::is_whitespace).next().unwrap_or(key);
        let value = rest[eq + 1..].trim_start();
        let quote = value.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let close = value[1..].find(quote)?;
        if key == name {
            return Some(&value[1..1 + close]);
        }
        rest = &value[close + 2..];
    }
    None
}

/// Pixel size from the `Pixels` element of an OME-XML description.
///
/// Missing units default to micrometres. Sizes are normalised to micrometres
/// so that cycles written by different tools compare directly.
pub fn parse_calibration(xml: &str) -> Option<CalibrationMetadata> {
    let x: f64 = element_attribute(xml, "Pixels", "PhysicalSizeX")?
        .trim()
        .parse()
        .ok()?;
    let y: f64 = element_attribute(xml, "Pixels", "PhysicalSizeY")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(x);
    if !(x > 0.0 && y > 0.0) {
        return None;
    }

    let unit_x = element_attribute(xml, "Pixels", "PhysicalSizeXUnit")
        .and_then(LengthUnit::from_symbol)
        .unwrap_or_default();
    let unit_y = element_attribute(xml, "Pixels", "PhysicalSizeYUnit")
        .and_then(LengthUnit::from_symbol)
        .unwrap_or(unit_x);

    Some(CalibrationMetadata {
        pixel_size_x: x * unit_x.in_microns(),
        pixel_size_y: y * unit_y.in_microns(),
        unit: LengthUnit::Micrometer,
    })
}

/// Channel names listed in an OME-XML description, in order.
pub fn parse_channel_names(xml: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut search = 0;
    while let Some(pos) = xml[search..].find("<Channel ") {
        let start = search + pos;
        if let Some(name) = element_attribute(&xml[start..], "Channel", "Name") {
            names.push(unescape(name));
        }
        search = start + "<Channel ".len();
    }
    names
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// OME-XML for a `CYX` stack of `channel_names.len()` planes.
pub fn build(
    width: usize,
    height: usize,
    pixel_type: PixelType,
    calibration: &CalibrationMetadata,
    channel_names: &[String],
) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    xml.push_str(
        "<OME xmlns=\"http://www.openmicroscopy.org/Schemas/OME/2016-06\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:schemaLocation=\"http://www.openmicroscopy.org/Schemas/OME/2016-06 \
         http://www.openmicroscopy.org/Schemas/OME/2016-06/ome.xsd\">",
    );
    xml.push_str("<Image ID=\"Image:0\" Name=\"registered\">");
    let _ = write!(
        xml,
        "<Pixels ID=\"Pixels:0\" DimensionOrder=\"XYCZT\" Type=\"{}\" \
         SizeX=\"{}\" SizeY=\"{}\" SizeC=\"{}\" SizeZ=\"1\" SizeT=\"1\" \
         PhysicalSizeX=\"{}\" PhysicalSizeXUnit=\"{}\" \
         PhysicalSizeY=\"{}\" PhysicalSizeYUnit=\"{}\">",
        pixel_type.ome_name(),
        width,
        height,
        channel_names.len(),
        calibration.pixel_size_x,
        calibration.unit.symbol(),
        calibration.pixel_size_y,
        calibration.unit.symbol(),
    );
    for (i, name) in channel_names.iter().enumerate() {
        let _ = write!(
            xml,
            "<Channel ID=\"Channel:0:{}\" Name=\"{}\" SamplesPerPixel=\"1\"/>",
            i,
            escape(name)
        );
    }
    for i in 0..channel_names.len() {
        let _ = write!(
            xml,
            "<TiffData FirstC=\"{}\" FirstZ=\"0\" FirstT=\"0\" IFD=\"{}\" PlaneCount=\"1\"/>",
            i, i
        );
    }
    xml.push_str("</Pixels></Image></OME>");
    xml
}
