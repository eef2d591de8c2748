pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod fips;
pub mod geometry;
pub mod getter;
pub mod normalize;
pub mod request;
pub mod table;

pub use census::{
    Breakdown, Category, CharacteristicsRecord, EstimateRecord, FlowBreakdown, FlowRecord,
    FlowVariable, Geography, LabelTable,
};

pub use api::CensusApi;
pub use client::{estimates_with_geometry, flows_with_centroids, LocatedEstimates, PopClient};
pub use config::ClientConfig;
pub use error::{PopError, Result};
pub use fips::FipsCatalog;
pub use geometry::{GeometryMap, GeometrySource, LayoutShift, Located, Resolution};
pub use getter::{Getter, RawTable};
pub use normalize::{EstimatesTable, UnknownCodePolicy};
pub use request::{is_rate_variable, EstimatesRequest, FlowsRequest, Product, Query};
