//! Loading of the administrative-boundary reference set at its finest subdivision level.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use itertools::izip;
use log::{debug, info};
use polars::prelude::*;

use crate::{
    config::GazetteerConfig,
    normalize::{normalize, NormalizedName},
    tables::{non_blank, read_table, required_text_column, text_column},
    COL,
};

#[derive(Clone, Debug, PartialEq)]
pub struct GazetteerEntry {
    pub name: String,
    pub normalized: NormalizedName,
    pub id: String,
    pub district: Option<String>,
    pub region: Option<String>,
    pub province: Option<String>,
    /// Boundary as WKT, only used for GeoJSON output.
    pub geometry: Option<String>,
}

impl GazetteerEntry {
    pub fn new(name: &str, id: &str) -> Self {
        Self {
            name: name.to_string(),
            normalized: normalize(name),
            id: id.to_string(),
            district: None,
            region: None,
            province: None,
            geometry: None,
        }
    }

    /// Entry from raw field values. Units without a name or identifier cannot be matched and
    /// are dropped.
    fn from_fields(
        name: Option<&str>,
        id: Option<&str>,
        district: Option<&str>,
        region: Option<&str>,
        province: Option<&str>,
        geometry: Option<String>,
    ) -> Option<Self> {
        let (Some(name), Some(id)) = (non_blank(name), non_blank(id)) else {
            debug!("Skipping gazetteer unit without name or id: {name:?} / {id:?}");
            return None;
        };
        Some(Self {
            district: non_blank(district),
            region: non_blank(region),
            province: non_blank(province),
            geometry,
            ..Self::new(&name, &id)
        })
    }
}

/// The reference set, in file order. Order matters: the matcher breaks ties by it.
#[derive(Clone, Debug, Default)]
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
    by_id: HashMap<String, usize>,
}

impl Gazetteer {
    pub fn new(entries: Vec<GazetteerEntry>) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            by_id.entry(entry.id.clone()).or_insert(idx);
        }
        Self { entries, by_id }
    }

    /// Load from a `.csv` or `.parquet` export of the boundary set.
    pub fn load(config: &GazetteerConfig) -> Result<Self> {
        info!("Loading gazetteer from '{}'", config.path.display());
        let entries = load_table(&config.path, config)?;
        info!("Loaded {} gazetteer units", entries.len());
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[GazetteerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<NormalizedName> {
        self.entries.iter().map(|e| e.normalized.clone()).collect()
    }

    pub fn get(&self, idx: usize) -> Option<&GazetteerEntry> {
        self.entries.get(idx)
    }

    pub fn by_id(&self, id: &str) -> Option<&GazetteerEntry> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    /// First unit whose normalized name equals `name`.
    pub fn by_name(&self, name: &NormalizedName) -> Option<&GazetteerEntry> {
        self.entries.iter().find(|e| &e.normalized == name)
    }

    pub fn to_df(&self) -> PolarsResult<DataFrame> {
        let text = |name: &str, f: fn(&GazetteerEntry) -> Option<&str>| {
            Series::new(name, self.entries.iter().map(f).collect::<Vec<_>>())
        };
        DataFrame::new(vec![
            text(COL::GAZETTEER_ID, |e| Some(e.id.as_str())),
            text(COL::GAZETTEER_NAME, |e| Some(e.name.as_str())),
            text(COL::MUNICIPALITY_NORMALIZED, |e| Some(e.normalized.as_str())),
            text(COL::DISTRICT, |e| e.district.as_deref()),
            text(COL::REGION, |e| e.region.as_deref()),
            text(COL::PROVINCE, |e| e.province.as_deref()),
        ])
    }
}

fn load_table(path: &Path, config: &GazetteerConfig) -> Result<Vec<GazetteerEntry>> {
    let df = read_table(path, false)?;
    let names = required_text_column(&df, &config.name_column, path)?;
    let ids = required_text_column(&df, &config.id_column, path)?;
    let districts = text_column(&df, &config.district_column)?;
    let regions = text_column(&df, &config.region_column)?;
    let provinces = text_column(&df, &config.province_column)?;
    let geometries = text_column(&df, &config.geometry_column)?;
    Ok(izip!(
        names.str()?,
        ids.str()?,
        districts.str()?,
        regions.str()?,
        provinces.str()?,
        geometries.str()?,
    )
    .filter_map(|(name, id, district, region, province, geometry)| {
        GazetteerEntry::from_fields(
            name,
            id,
            district,
            region,
            province,
            geometry.map(str::to_owned),
        )
    })
    .collect())
}
