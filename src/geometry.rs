use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use census::{Category, CharacteristicsRecord, EstimateRecord, FlowRecord, Geography};
use geo::{Centroid, Geometry, LineString, Point};
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::{Map, Value as JsonValue};

use crate::error::{PopError, Result};

pub type GeometryMap = HashMap<String, Geometry<f64>>;

pub const DEFAULT_ID_PROPERTY: &str = "GEOID";

/// Cartographic boundary file scales.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Resolution {
    #[default]
    R500k,
    R5m,
    R20m,
}

impl Resolution {
    pub fn name(&self) -> &'static str {
        match self {
            Resolution::R500k => "500k",
            Resolution::R5m => "5m",
            Resolution::R20m => "20m",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "500k" => Ok(Resolution::R500k),
            "5m" => Ok(Resolution::R5m),
            "20m" => Ok(Resolution::R20m),
            other => Err(format!("unknown resolution '{other}'; use 500k, 5m or 20m")),
        }
    }
}

/// Token used for a level in boundary file names, e.g. `cb_2019_us_county_500k`.
pub fn file_token(geography: Geography) -> &'static str {
    match geography {
        Geography::Us => "nation",
        Geography::Region => "region",
        Geography::Division => "division",
        Geography::State => "state",
        Geography::County => "county",
        Geography::CountySubdivision => "cousub",
        Geography::Cbsa => "cbsa",
        Geography::CombinedStatisticalArea => "csa",
        Geography::Place => "place",
    }
}

/// Provides geometry for a summary level, keyed by GEOID.
#[async_trait]
pub trait GeometrySource {
    async fn geometry_for(
        &self,
        geography: Geography,
        resolution: Resolution,
        vintage: u16,
    ) -> Result<GeometryMap>;
}

#[async_trait]
impl GeometrySource for GeometryMap {
    async fn geometry_for(&self, _: Geography, _: Resolution, _: u16) -> Result<GeometryMap> {
        Ok(self.clone())
    }
}

/// Moves outlying geometries for a compact national layout.
pub trait LayoutShift {
    fn shift(&self, geometries: GeometryMap) -> Result<GeometryMap>;
}

/// Key every feature of a collection by its `id_property`.
///
/// Features without geometry are skipped; a missing id or a repeated id is an error.
pub fn geometry_map(collection: FeatureCollection, id_property: &str) -> Result<GeometryMap> {
    let mut map = GeometryMap::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let id = match feature.property(id_property) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => {
                return Err(PopError::Geometry(format!(
                    "feature {i} has no '{id_property}' property"
                )))
            }
        };
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from(geometry.value)
            .map_err(|e| PopError::Geometry(format!("feature {id}: {e}")))?;
        if map.insert(id.clone(), geometry).is_some() {
            return Err(PopError::Geometry(format!("duplicate {id_property} {id}")));
        }
    }
    Ok(map)
}

fn parse_collection(text: &str) -> Result<FeatureCollection> {
    text.parse::<FeatureCollection>()
        .map_err(|e| PopError::Geometry(e.to_string()))
}

/// A GeoJSON file on disk holding one level's boundaries.
#[derive(Clone, Debug)]
pub struct GeoJsonFile {
    path: PathBuf,
    id_property: String,
}

impl GeoJsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_property: DEFAULT_ID_PROPERTY.to_string(),
        }
    }

    pub fn with_id_property(mut self, id_property: impl Into<String>) -> Self {
        self.id_property = id_property.into();
        self
    }
}

#[async_trait]
impl GeometrySource for GeoJsonFile {
    async fn geometry_for(&self, _: Geography, _: Resolution, _: u16) -> Result<GeometryMap> {
        let text = std::fs::read_to_string(&self.path)?;
        geometry_map(parse_collection(&text)?, &self.id_property)
    }
}

/// Zipped GeoJSON boundaries downloaded over HTTP.
///
/// `url_template` and `member_template` may contain `{vintage}`, `{level}`
/// and `{resolution}`, e.g.
/// `https://example.org/cb_{vintage}_us_{level}_{resolution}.zip`.
#[derive(Clone, Debug)]
pub struct GeoJsonArchive {
    client: reqwest::Client,
    url_template: String,
    member_template: String,
    id_property: String,
}

impl GeoJsonArchive {
    pub fn new(url_template: impl Into<String>, member_template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url_template: url_template.into(),
            member_template: member_template.into(),
            id_property: DEFAULT_ID_PROPERTY.to_string(),
        }
    }

    pub fn with_id_property(mut self, id_property: impl Into<String>) -> Self {
        self.id_property = id_property.into();
        self
    }
}

pub fn render_template(
    template: &str,
    geography: Geography,
    resolution: Resolution,
    vintage: u16,
) -> String {
    template
        .replace("{vintage}", &vintage.to_string())
        .replace("{level}", file_token(geography))
        .replace("{resolution}", resolution.name())
}

/// Read one GeoJSON member out of a zip archive.
pub fn read_archive_member<R: Read + Seek>(reader: R, member: &str) -> Result<FeatureCollection> {
    let mut zip = zip::ZipArchive::new(reader)?;
    let mut file = zip.by_name(member)?;
    let mut buffer = String::new();
    file.read_to_string(&mut buffer)?;
    parse_collection(&buffer)
}

#[async_trait]
impl GeometrySource for GeoJsonArchive {
    async fn geometry_for(
        &self,
        geography: Geography,
        resolution: Resolution,
        vintage: u16,
    ) -> Result<GeometryMap> {
        let url = render_template(&self.url_template, geography, resolution, vintage);
        let member = render_template(&self.member_template, geography, resolution, vintage);
        tracing::debug!(%url, %member, "fetching boundaries");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PopError::UpstreamRequestFailed(format!(
                "{url} returned {status}"
            )));
        }
        let mut tmpfile = tempfile::tempfile()?;
        tmpfile.write_all(&response.bytes().await?)?;
        let collection = read_archive_member(tmpfile, &member)?;
        geometry_map(collection, &self.id_property)
    }
}

/// Fetch geometry for a level, applying `shift` when given.
pub async fn load_geometry<S: GeometrySource + ?Sized>(
    source: &S,
    geography: Geography,
    resolution: Resolution,
    vintage: u16,
    shift: Option<&dyn LayoutShift>,
) -> Result<GeometryMap> {
    let geometries = source.geometry_for(geography, resolution, vintage).await?;
    tracing::debug!(features = geometries.len(), %geography, "loaded geometry");
    match shift {
        Some(shift) => shift.shift(geometries),
        None => Ok(geometries),
    }
}

/// Records that join to geometry through a single GEOID.
pub trait Keyed {
    fn geoid(&self) -> &str;
}

impl Keyed for EstimateRecord {
    fn geoid(&self) -> &str {
        &self.geoid
    }
}

impl Keyed for CharacteristicsRecord {
    fn geoid(&self) -> &str {
        &self.geoid
    }
}

/// A record with its (possibly missing) geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Located<T> {
    pub record: T,
    pub geometry: Option<Geometry<f64>>,
}

/// Left join on GEOID: every record is kept, unmatched ones with no geometry.
pub fn attach_geometry<T: Keyed>(records: Vec<T>, geometries: &GeometryMap) -> Vec<Located<T>> {
    records
        .into_iter()
        .map(|record| {
            let geometry = geometries.get(record.geoid()).cloned();
            Located { record, geometry }
        })
        .collect()
}

/// A flow with origin and destination centroids.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowCentroids {
    pub flow: FlowRecord,
    pub centroid1: Option<Point<f64>>,
    pub centroid2: Option<Point<f64>>,
}

/// Two independent left joins, on GEOID1 and GEOID2.
///
/// Polygons are reduced to their centroid; counterparts outside the US have
/// no GEOID2 and therefore no `centroid2`.
pub fn attach_centroids(flows: Vec<FlowRecord>, geometries: &GeometryMap) -> Vec<FlowCentroids> {
    let mut centroids: HashMap<&str, Option<Point<f64>>> = HashMap::new();
    let mut centroid = |geoid: &str| -> Option<Point<f64>> {
        if let Some(point) = centroids.get(geoid) {
            return *point;
        }
        let (key, geometry) = geometries.get_key_value(geoid)?;
        let point = geometry.centroid();
        centroids.insert(key.as_str(), point);
        point
    };

    flows
        .into_iter()
        .map(|flow| {
            let centroid1 = centroid(flow.geoid1.as_str());
            let centroid2 = flow.geoid2.as_deref().and_then(&mut centroid);
            FlowCentroids {
                flow,
                centroid1,
                centroid2,
            }
        })
        .collect()
}

/// Flat column/value pairs used as GeoJSON feature properties.
pub trait Properties {
    fn properties(&self) -> Map<String, JsonValue>;
}

fn category_value(category: &Category) -> JsonValue {
    match category {
        Category::Code(code) => JsonValue::from(*code),
        Category::Label(label) => JsonValue::from(label.as_str()),
    }
}

impl Properties for EstimateRecord {
    fn properties(&self) -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert("GEOID".into(), self.geoid.clone().into());
        map.insert("NAME".into(), self.name.clone().into());
        map.insert("variable".into(), self.variable.clone().into());
        map.insert("value".into(), self.value.into());
        map.insert("moe".into(), self.moe.into());
        map
    }
}

impl Properties for CharacteristicsRecord {
    fn properties(&self) -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert("GEOID".into(), self.geoid.clone().into());
        map.insert("NAME".into(), self.name.clone().into());
        for (breakdown, category) in &self.categories {
            map.insert(breakdown.name().into(), category_value(category));
        }
        map.insert("value".into(), self.value.into());
        map
    }
}

impl Properties for FlowRecord {
    fn properties(&self) -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert("GEOID1".into(), self.geoid1.clone().into());
        map.insert("GEOID2".into(), self.geoid2.clone().into());
        map.insert("FULL1_NAME".into(), self.full1_name.clone().into());
        map.insert("FULL2_NAME".into(), self.full2_name.clone().into());
        map.insert("variable".into(), self.variable.name().into());
        map.insert("estimate".into(), self.estimate.into());
        map.insert("moe".into(), self.moe.into());
        for (breakdown, category) in &self.categories {
            map.insert(breakdown.name().into(), category_value(category));
        }
        map
    }
}

fn feature(geometry: Option<&Geometry<f64>>, properties: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: geometry.map(|g| geojson::Geometry::new(geojson::Value::from(g))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn to_feature_collection<T: Properties>(rows: &[Located<T>]) -> FeatureCollection {
    rows.iter()
        .map(|row| feature(row.geometry.as_ref(), row.record.properties()))
        .collect()
}

/// Flows become origin→destination lines, or the origin point when the
/// destination has no centroid.
pub fn flows_feature_collection(rows: &[FlowCentroids]) -> FeatureCollection {
    rows.iter()
        .map(|row| {
            let geometry = match (row.centroid1, row.centroid2) {
                (Some(a), Some(b)) => Some(Geometry::LineString(LineString::from(vec![a, b]))),
                (Some(a), None) => Some(Geometry::Point(a)),
                _ => None,
            };
            let mut properties = row.flow.properties();
            properties.insert("centroid1".into(), point_value(row.centroid1));
            properties.insert("centroid2".into(), point_value(row.centroid2));
            feature(geometry.as_ref(), properties)
        })
        .collect()
}

fn point_value(point: Option<Point<f64>>) -> JsonValue {
    point.map_or(JsonValue::Null, |p| JsonValue::from(vec![p.x(), p.y()]))
}

pub fn write_geojson(path: impl AsRef<Path>, collection: FeatureCollection) -> Result<()> {
    std::fs::write(path, GeoJson::from(collection).to_string())?;
    Ok(())
}
