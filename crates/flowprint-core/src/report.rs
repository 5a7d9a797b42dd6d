//! Result CSVs for operator auditing.
//!
//! Semicolon-separated, one directory per database per run. These files are
//! observability artifacts: later stages consume in-memory match tables, not
//! the CSVs. Exchange names in this domain are comma-heavy, which is why the
//! separator is a semicolon; a field containing the separator or a quote is
//! quoted.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::classify::{MatchTable, MaterialActivity};
use crate::flatten::{FlatRow, FlatTable};

const SEP: char = ';';

fn field(value: &str) -> String {
    if value.contains(SEP) || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_line(out: &mut impl Write, fields: &[String]) -> std::io::Result<()> {
    writeln!(out, "{}", fields.join(&SEP.to_string()))
}

fn row_fields(row: &FlatRow) -> Vec<String> {
    vec![
        field(&row.database),
        field(&row.code),
        field(&row.name),
        field(&row.location),
        field(&row.reference_product),
        field(&row.ex_name),
        row.ex_amount.to_string(),
        field(&row.ex_unit),
        row.ex_type.as_str().to_string(),
        field(row.ex_location.as_deref().unwrap_or("")),
    ]
}

const ROW_HEADER: &[&str] = &[
    "database",
    "code",
    "name",
    "location",
    "reference_product",
    "ex_name",
    "ex_amount",
    "ex_unit",
    "ex_type",
    "ex_location",
];

fn write_rows(path: &Path, rows: &[FlatRow], group: Option<&str>) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut header: Vec<String> = ROW_HEADER.iter().map(|s| s.to_string()).collect();
    if group.is_some() {
        header.push("material_group".to_string());
    }
    write_line(&mut out, &header)?;
    for row in rows {
        let mut fields = row_fields(row);
        if let Some(group) = group {
            fields.push(field(group));
        }
        write_line(&mut out, &fields)?;
    }
    out.flush()
}

/// Per-database results directory, replacing anything left by an earlier run.
pub fn prepare_results_dir(results_dir: &Path, db_name: &str) -> std::io::Result<PathBuf> {
    let dir = results_dir.join(db_name);
    if dir.exists() {
        tracing::info!(dir = %dir.display(), "replacing existing results directory");
        std::fs::remove_dir_all(&dir)?;
    }
    std::fs::create_dir_all(dir.join("grouped"))?;
    Ok(dir)
}

/// One CSV per non-empty waste category, named by the category code.
pub fn write_waste_results(db_dir: &Path, tables: &[MatchTable]) -> std::io::Result<()> {
    for table in tables {
        if table.is_empty() {
            continue;
        }
        let path = db_dir.join(format!("{}.csv", table.category.code()));
        write_rows(&path, &table.rows, None)?;
    }
    Ok(())
}

/// The matched material markets, their classification metadata, and the
/// grouped exchange CSVs.
pub fn write_material_results(
    db_dir: &Path,
    activities: &[MaterialActivity],
    tables: &[MatchTable],
) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(db_dir.join("material_activities.csv"))?);
    write_line(
        &mut out,
        &[
            "code", "name", "location", "reference_product", "unit", "material_group",
            "classifications", "inferred",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>(),
    )?;
    for act in activities {
        let classifications = act
            .classifications
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(" | ");
        write_line(
            &mut out,
            &[
                field(&act.code),
                field(&act.name),
                field(&act.location),
                field(&act.reference_product),
                field(&act.unit),
                field(&act.group),
                field(&classifications),
                act.inferred_classifications.to_string(),
            ],
        )?;
    }
    out.flush()?;

    // all matched exchanges in one file, plus one file per group
    let mut all_rows: Vec<(&str, &FlatRow)> = Vec::new();
    for table in tables {
        let group = match &table.category {
            crate::Category::Material { group } => group.as_str(),
            crate::Category::Waste { .. } => continue,
        };
        for row in &table.rows {
            all_rows.push((group, row));
        }
        if !table.is_empty() {
            let path = db_dir
                .join("grouped")
                .join(format!("{}.csv", table.category.code()));
            write_rows(&path, &table.rows, Some(group))?;
        }
    }

    let mut out = BufWriter::new(File::create(db_dir.join("material_exchanges.csv"))?);
    let mut header: Vec<String> = ROW_HEADER.iter().map(|s| s.to_string()).collect();
    header.push("material_group".to_string());
    write_line(&mut out, &header)?;
    for (group, row) in all_rows {
        let mut fields = row_fields(row);
        fields.push(field(group));
        write_line(&mut out, &fields)?;
    }
    out.flush()
}

/// Optional CSV rendering of a flat table, alongside the binary cache.
pub fn write_flat_csv(tmp_dir: &Path, table: &FlatTable) -> std::io::Result<PathBuf> {
    let path = tmp_dir.join(format!("{}_flat.csv", table.database));
    write_rows(&path, &table.rows, None)?;
    Ok(path)
}
