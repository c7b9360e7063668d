pub mod align;
pub mod catalog;
pub mod concat;
pub mod consts;
pub mod cycle;
pub mod error;
pub mod filters;
pub mod io;
pub mod pipeline;
pub mod pyramid;
pub mod resample;
pub mod selection;
