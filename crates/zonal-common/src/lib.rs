//! Common types shared by the land-cover/climate zonal statistics crates.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod legend;
pub mod time;

pub use bbox::{BoundingBox, GeoPoint};
pub use error::{CommonError, CommonResult};
pub use grid::{GridSpec, GridWindow};
pub use legend::{Color, LandCoverLegend, LegendEntry, VisParams};
pub use time::{parse_date, DateRange};
