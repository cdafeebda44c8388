//! System details pulled from a record's attribute bag.
//!
//! Field names vary by jurisdiction. Each detail is read from the field
//! the Florida permit schema defines first (marked verified), then from a
//! list of looser aliases seen across other sources.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike as _};
use regex::Regex;
use septic_map_lookup_models::{AttributeValue, Attributes, SepticRecord, SystemField, SystemInfo};

/// A four-digit year between 1800 and 2099 standing on its own.
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").expect("valid regex"));

/// Integers above this are read as epoch milliseconds rather than years.
const EPOCH_MILLIS_FLOOR: i64 = 100_000_000_000;

const SYSTEM_TYPE_ALIASES: &[&str] = &[
    "SYSTEM_TYPE",
    "system_type",
    "SystemType",
    "WW",
    "LANDUSE",
];
const PERMIT_NUMBER_ALIASES: &[&str] = &[
    "PERMIT_NUMBER",
    "permit_number",
    "PermitNumber",
    "PERMIT_NO",
    "PARCELNO",
    "ALT_KEY",
];
const PERMIT_DATE_ALIASES: &[&str] = &[
    "PERMIT_DATE",
    "permit_date",
    "PermitDate",
    "APPROVAL_DATE",
    "WW_UPD",
    "ASMNT_YR",
];
const INSTALL_DATE_ALIASES: &[&str] = &["INSTALL_DATE", "install_date", "InstallDate"];
const LAST_SERVICE_ALIASES: &[&str] = &[
    "LAST_SERVICE_DATE",
    "last_service_date",
    "LastServiceDate",
];

/// Extracts a [`SystemInfo`] summary from `record`.
#[must_use]
pub fn extract(record: &SepticRecord) -> SystemInfo {
    let attrs = &record.attributes;

    let capacity_gpd = attrs.get("ESTIMGPD").and_then(as_number);

    let permit_date = date_field(attrs, "APPRDATE", PERMIT_DATE_ALIASES);
    let install_year = year_from(attrs, "APPRDATE")
        .or_else(|| PERMIT_DATE_ALIASES.iter().find_map(|k| year_from(attrs, k)))
        .or_else(|| INSTALL_DATE_ALIASES.iter().find_map(|k| year_from(attrs, k)));

    SystemInfo {
        system_type: field(attrs, "SYSTTYPE", SYSTEM_TYPE_ALIASES),
        permit_number: field(attrs, "APNO", PERMIT_NUMBER_ALIASES),
        capacity: capacity_gpd.map(|gpd| SystemField {
            value: format!("{} GPD", format_number(gpd)),
            verified: true,
        }),
        estimated_tank_size: capacity_gpd.map(|gpd| tank_size_for_gpd(gpd).to_string()),
        lot_size: field(attrs, "ACREAGE", &["ACRES"]).map(|f| SystemField {
            value: format!("{} acres", f.value),
            verified: true,
        }),
        property_type: field(attrs, "COMRESID", &[]),
        water_supply: field(attrs, "WSUPLTYP", &[]),
        approval_status: field(attrs, "FINSYSAPRV", &[]),
        permit_date,
        final_inspection_date: date_field(attrs, "FINALINSP", &[]),
        install_date: first_display(attrs, INSTALL_DATE_ALIASES),
        last_service_date: first_display(attrs, LAST_SERVICE_ALIASES),
        tax_folio: field(attrs, "FOLIO", &["GEOFOLIO"]).map(|f| SystemField {
            verified: true,
            ..f
        }),
        system_address: first_display(attrs, &["SYSTADDR"]),
        install_year,
        data_source: non_empty(&record.data_source),
        county: non_empty(&record.county),
        state: non_empty(&record.state),
    }
}

/// Tank size band for a design flow in gallons per day.
#[must_use]
pub fn tank_size_for_gpd(gpd: f64) -> &'static str {
    if gpd <= 200.0 {
        "750-1000 gallons"
    } else if gpd <= 300.0 {
        "1000-1250 gallons"
    } else if gpd <= 400.0 {
        "1250-1500 gallons"
    } else {
        "1500+ gallons"
    }
}

fn field(attrs: &Attributes, primary: &str, aliases: &[&str]) -> Option<SystemField> {
    if let Some(value) = attrs.get(primary).and_then(AttributeValue::to_display) {
        return Some(SystemField {
            value,
            verified: true,
        });
    }
    first_display(attrs, aliases).map(|value| SystemField {
        value,
        verified: false,
    })
}

fn date_field(attrs: &Attributes, primary: &str, aliases: &[&str]) -> Option<SystemField> {
    if let Some(value) = attrs.get(primary).and_then(render_date) {
        return Some(SystemField {
            value,
            verified: true,
        });
    }
    aliases
        .iter()
        .find_map(|k| attrs.get(*k).and_then(render_date))
        .map(|value| SystemField {
            value,
            verified: false,
        })
}

fn first_display(attrs: &Attributes, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| attrs.get(*k).and_then(AttributeValue::to_display))
}

/// Renders epoch-millisecond timestamps as `YYYY-MM-DD`, everything else
/// as recorded.
fn render_date(value: &AttributeValue) -> Option<String> {
    if let Some(millis) = epoch_millis(value) {
        return DateTime::from_timestamp_millis(millis)
            .map(|dt| dt.format("%Y-%m-%d").to_string());
    }
    value.to_display()
}

fn year_from(attrs: &Attributes, key: &str) -> Option<i32> {
    attrs.get(key).and_then(parse_year)
}

/// Parses a year from a bare year number, epoch milliseconds, or the first
/// standalone four-digit year in a string.
#[allow(clippy::cast_possible_truncation)]
fn parse_year(value: &AttributeValue) -> Option<i32> {
    if let Some(millis) = epoch_millis(value) {
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.year());
    }
    match value {
        AttributeValue::Integer(i) => i32::try_from(*i)
            .ok()
            .filter(|y| (1800..2100).contains(y)),
        AttributeValue::Float(f) if f.is_finite() && (1800.0..2100.0).contains(f) => {
            Some(f.trunc() as i32)
        }
        AttributeValue::Text(s) => YEAR_RE
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_millis(value: &AttributeValue) -> Option<i64> {
    match value {
        AttributeValue::Integer(i) if *i >= EPOCH_MILLIS_FLOOR => Some(*i),
        AttributeValue::Float(f) if f.is_finite() && *f >= 1e11 && *f < 1e15 => {
            Some(f.trunc() as i64)
        }
        AttributeValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|i| *i >= EPOCH_MILLIS_FLOOR),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_number(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Integer(i) => Some(*i as f64),
        AttributeValue::Float(f) if f.is_finite() => Some(*f),
        AttributeValue::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
