use comfy_table::{presets::NOTHING, *};
use itertools::izip;

use placematch::{review::Correction, COL};
use polars::prelude::*;

fn new_table(header: Vec<String>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        )
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

pub fn display_gazetteer(gazetteer: DataFrame, max_results: Option<usize>) -> anyhow::Result<()> {
    let total = gazetteer.height();
    let df_to_show = match max_results {
        Some(max) => gazetteer.head(Some(max)),
        None => gazetteer,
    };
    let mut table = new_table(
        ["Gazetteer ID", "Name", "Normalized", "District", "Region", "Province"]
            .map(String::from)
            .to_vec(),
    );
    for (id, name, normalized, district, region, province) in izip!(
        df_to_show.column(COL::GAZETTEER_ID)?.str()?,
        df_to_show.column(COL::GAZETTEER_NAME)?.str()?,
        df_to_show.column(COL::MUNICIPALITY_NORMALIZED)?.str()?,
        df_to_show.column(COL::DISTRICT)?.str()?,
        df_to_show.column(COL::REGION)?.str()?,
        df_to_show.column(COL::PROVINCE)?.str()?,
    ) {
        table.add_row(vec![
            id.unwrap_or_default(),
            name.unwrap_or_default(),
            normalized.unwrap_or_default(),
            district.unwrap_or_default(),
            region.unwrap_or_default(),
            province.unwrap_or_default(),
        ]);
    }
    println!("\n{}", table);
    println!("Showing {} of {total} gazetteer units", df_to_show.height());
    Ok(())
}

/// One row per observatory, one column per year.
pub fn display_counts(counts: &DataFrame) -> anyhow::Result<()> {
    let year_columns: Vec<Series> = counts
        .get_columns()
        .iter()
        .filter(|s| s.name() != COL::OBSERVATORY_CODE && s.name() != COL::OBSERVATORY_NAME)
        .map(|s| s.cast(&DataType::UInt64))
        .collect::<PolarsResult<_>>()?;
    let mut header = vec!["Observatory".to_string(), "Name".to_string()];
    header.extend(year_columns.iter().map(|s| s.name().to_string()));
    let mut table = new_table(header);

    for (idx, (code, name)) in izip!(
        counts.column(COL::OBSERVATORY_CODE)?.str()?,
        counts.column(COL::OBSERVATORY_NAME)?.str()?,
    )
    .enumerate()
    {
        let mut row = vec![
            code.unwrap_or_default().to_string(),
            name.unwrap_or_default().to_string(),
        ];
        for series in &year_columns {
            row.push(series.u64()?.get(idx).unwrap_or_default().to_string());
        }
        table.add_row(row);
    }
    println!("\n{}", table);
    Ok(())
}

pub fn display_orphaned(corrections: &[Correction]) {
    let mut table = new_table(
        ["Observatory", "Municipality", "Corrected name", "Corrected ID"]
            .map(String::from)
            .to_vec(),
    );
    for correction in corrections {
        table.add_row(vec![
            correction.key.observatory_code.as_deref().unwrap_or_default(),
            correction.key.municipality.as_str(),
            correction.gazetteer_name.as_deref().unwrap_or_default(),
            correction.gazetteer_id.as_deref().unwrap_or_default(),
        ]);
    }
    println!("\nCorrections not matching any location:\n{}", table);
}
