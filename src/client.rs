use census::{CharacteristicsRecord, EstimateRecord, FlowRecord};

use crate::api::CensusApi;
use crate::config::ClientConfig;
use crate::error::{PopError, Result};
use crate::fips::FipsCatalog;
use crate::geometry::{
    attach_centroids, attach_geometry, load_geometry, FlowCentroids, GeometrySource, LayoutShift,
    Located, Resolution,
};
use crate::getter::Getter;
use crate::normalize::{normalize_estimates, normalize_flows, EstimatesTable, UnknownCodePolicy};
use crate::request::{EstimatesRequest, FlowsRequest, Shape};

/// Estimates with geometry attached, by schema.
#[derive(Clone, Debug, PartialEq)]
pub enum LocatedEstimates {
    Long(Vec<Located<EstimateRecord>>),
    Characteristics(Vec<Located<CharacteristicsRecord>>),
}

pub struct PopClient<G = CensusApi> {
    getter: G,
    fips: FipsCatalog,
    unknown_codes: UnknownCodePolicy,
}

impl PopClient<CensusApi> {
    pub fn from_config(config: ClientConfig) -> Self {
        Self::new(CensusApi::new(config))
    }
}

impl<G: Getter + Sync> PopClient<G> {
    pub fn new(getter: G) -> Self {
        Self {
            getter,
            fips: FipsCatalog::states_only(),
            unknown_codes: UnknownCodePolicy::default(),
        }
    }

    /// Catalog used to resolve county names.
    pub fn with_fips(mut self, fips: FipsCatalog) -> Self {
        self.fips = fips;
        self
    }

    pub fn with_unknown_codes(mut self, policy: UnknownCodePolicy) -> Self {
        self.unknown_codes = policy;
        self
    }

    pub fn getter(&self) -> &G {
        &self.getter
    }

    pub async fn get_estimates(&self, request: &EstimatesRequest) -> Result<EstimatesTable> {
        let query = request.build(&self.fips)?;
        let Shape::Estimates(shape) = &query.shape else {
            return Err(PopError::invalid("estimates request built a non-estimates query"));
        };
        let raw = self.getter.fetch(&query).await?;
        let table = normalize_estimates(&raw, shape, self.unknown_codes)?;
        tracing::info!(
            product = %shape.product,
            geography = %shape.geography,
            vintage = shape.vintage,
            rows = table.len(),
            "estimates ready"
        );
        Ok(table)
    }

    pub async fn get_flows(&self, request: &FlowsRequest) -> Result<Vec<FlowRecord>> {
        let query = request.build(&self.fips)?;
        let Shape::Flows(shape) = &query.shape else {
            return Err(PopError::invalid("flows request built a non-flows query"));
        };
        let raw = self.getter.fetch(&query).await?;
        let flows = normalize_flows(&raw, shape, self.unknown_codes)?;
        tracing::info!(
            geography = %shape.geography,
            year = shape.year,
            rows = flows.len(),
            "flows ready"
        );
        Ok(flows)
    }
}

/// Join an estimates table to geometry for the request's level and vintage.
pub async fn estimates_with_geometry<S: GeometrySource + ?Sized>(
    table: EstimatesTable,
    request: &EstimatesRequest,
    source: &S,
    resolution: Resolution,
    shift: Option<&dyn LayoutShift>,
) -> Result<LocatedEstimates> {
    let geometries =
        load_geometry(source, request.geography, resolution, request.vintage, shift).await?;
    Ok(match table {
        EstimatesTable::Long(rows) => LocatedEstimates::Long(attach_geometry(rows, &geometries)),
        EstimatesTable::Characteristics(rows) => {
            LocatedEstimates::Characteristics(attach_geometry(rows, &geometries))
        }
    })
}

/// Attach origin and destination centroids to flows.
///
/// Boundaries are requested for the flows' level; `vintage` picks the boundary year.
pub async fn flows_with_centroids<S: GeometrySource + ?Sized>(
    flows: Vec<FlowRecord>,
    request: &FlowsRequest,
    source: &S,
    resolution: Resolution,
    vintage: u16,
) -> Result<Vec<FlowCentroids>> {
    let geometries = load_geometry(source, request.geography, resolution, vintage, None).await?;
    Ok(attach_centroids(flows, &geometries))
}
