use std::io::Write;

use anyhow::{anyhow, Context, Result};
use enum_dispatch::enum_dispatch;
use geo::geometry::Geometry;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wkt::TryFromWkt;

use crate::COL;

/// Convert a polars `AnyValue` to a JSON value. Covers the types the merged table holds.
fn any_value_to_json(value: &AnyValue) -> Result<Value> {
    match value {
        AnyValue::Null => Ok(Value::Null),
        AnyValue::Boolean(b) => Ok(Value::Bool(*b)),
        AnyValue::String(s) => Ok(Value::String((*s).to_string())),
        AnyValue::StringOwned(s) => Ok(Value::String(s.to_string())),
        AnyValue::Int8(n) => Ok(json!(*n)),
        AnyValue::Int16(n) => Ok(json!(*n)),
        AnyValue::Int32(n) => Ok(json!(*n)),
        AnyValue::Int64(n) => Ok(json!(*n)),
        AnyValue::UInt8(n) => Ok(json!(*n)),
        AnyValue::UInt16(n) => Ok(json!(*n)),
        AnyValue::UInt32(n) => Ok(json!(*n)),
        AnyValue::UInt64(n) => Ok(json!(*n)),
        AnyValue::Float32(n) => Ok(json!(*n)),
        AnyValue::Float64(n) => Ok(json!(*n)),
        other => Err(anyhow!("Cannot convert {other:?} to JSON")),
    }
}

/// Writes a `DataFrame` in some output format. `format` returns the serialized output and
/// `save` writes it.
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()>;
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        let mut data: Vec<u8> = Vec::new();
        self.save(&mut data, df)?;
        Ok(String::from_utf8(data)?)
    }
}

#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    Csv(CSVFormatter),
    GeoJSON(GeoJSONFormatter),
}

/// Plain CSV. A WKT geometry column, if present, is written as text.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CSVFormatter;

impl OutputGenerator for CSVFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        CsvWriter::new(writer).finish(df)?;
        Ok(())
    }
}

/// A GeoJSON feature collection with one feature per row that has a geometry. The other columns
/// become the feature properties.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct GeoJSONFormatter;

impl OutputGenerator for GeoJSONFormatter {
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        let geometry_col = df.column(COL::GEOMETRY)?;
        let other_cols = df.drop(COL::GEOMETRY)?;
        let mut features: Vec<geojson::Feature> = vec![];

        for (idx, geom) in geometry_col.str()?.into_iter().enumerate() {
            let Some(wkt_str) = geom else {
                continue;
            };
            let geom: Geometry<f64> = Geometry::try_from_wkt_str(wkt_str)
                .map_err(|err| anyhow!("{err}"))
                .with_context(|| format!("Invalid WKT geometry in row {idx}"))?;
            let mut properties = serde_json::Map::new();
            for col in other_cols.get_columns() {
                let val = any_value_to_json(&col.get(idx)?)?;
                properties.insert(col.name().to_string(), val);
            }
            features.push(geojson::Feature {
                geometry: Some(geojson::Geometry::from(&geom)),
                properties: Some(properties),
                bbox: None,
                id: None,
                foreign_members: None,
            });
        }

        let feature_collection = geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };
        Ok(feature_collection.to_string())
    }

    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        let result = self.format(df)?;
        writer.write_all(result.as_bytes())?;
        Ok(())
    }
}
