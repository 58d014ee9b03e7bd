use anyhow::Result;
use polars::prelude::{Column, DataFrame, DataType};

/// Stable parcel identifier, the cross-year join key.
pub const PARCEL_ID: &str = "cod_imovel";
pub const STATE_CODE: &str = "cod_estado";
pub const RECORD_TYPE: &str = "ind_tipo";
pub const STATUS_CODE: &str = "ind_status";

/// Canonical attribute columns, in projection order.
pub const CANONICAL_COLUMNS: [&str; 4] = [PARCEL_ID, STATUS_CODE, RECORD_TYPE, STATE_CODE];

/// Record type of rural property boundaries ("Imóvel Rural").
pub const BOUNDARY_TYPE: &str = "IRU";

/// Active ("AT") and pending ("PE") registrations.
pub const RETAINED_STATUSES: [&str; 2] = ["AT", "PE"];

/// Raw source column name -> canonical name.
pub const RENAME_MAP: [(&str, &str); 4] = [
    ("COD_IMOVEL", PARCEL_ID),
    ("COD_ESTADO", STATE_CODE),
    ("TIPO_IMOVE", RECORD_TYPE),
    ("SITUACAO", STATUS_CODE),
];

/// Rename recognized source columns to their canonical names.
///
/// Columns absent from the rename map are untouched, and absent sources are not an error, so
/// running this on an already-canonical table is a no-op.
pub fn standardize_columns(df: &mut DataFrame) -> Result<()> {
    for (source, canonical) in RENAME_MAP {
        if df.column(source).is_err() {
            continue;
        }
        if df.column(canonical).is_ok() {
            log::warn!("both {source:?} and {canonical:?} are present; keeping {canonical:?} and leaving {source:?} as is");
            continue;
        }
        df.rename(source, canonical.into())?;
    }
    Ok(())
}

/// Keep only the canonical columns, adding all-null ones for any the source lacks.
pub fn project_canonical(df: &DataFrame) -> Result<DataFrame> {
    let mut df = df.clone();
    for name in CANONICAL_COLUMNS {
        if df.column(name).is_err() {
            log::warn!("source has no {name:?} column; filling with nulls");
            df.with_column(Column::full_null(name.into(), df.height(), &DataType::String))?;
        }
    }
    Ok(df.select(CANONICAL_COLUMNS)?)
}

/// Whether a row passes the canonical record-type and status filter.
#[inline]
pub fn is_retained(record_type: Option<&str>, status_code: Option<&str>) -> bool {
    record_type == Some(BOUNDARY_TYPE)
        && status_code.is_some_and(|status| RETAINED_STATUSES.contains(&status))
}
