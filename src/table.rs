//! Raw flight tables, header normalization and typed flight records.
//!
//! Raw VRA exports carry Portuguese headers that were written as UTF-8 but are
//! read back as latin-1, so accented characters arrive double-encoded
//! (`AÃ©rea` instead of `Aérea`). Normalization repairs that first and then
//! maps the known headers onto canonical snake_case names. Headers outside
//! the known set pass through (repaired, otherwise untouched).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const COL_AIRLINE: &str = "airline";
pub const COL_FLIGHT_NUMBER: &str = "flight_number";
pub const COL_AUTHORIZATION_CODE: &str = "authorization_code";
pub const COL_LINE_TYPE: &str = "line_type";
pub const COL_ORIGIN_AIRPORT: &str = "origin_airport";
pub const COL_DESTINATION_AIRPORT: &str = "destination_airport";
pub const COL_SCHEDULED_DEPARTURE: &str = "scheduled_departure";
pub const COL_ACTUAL_DEPARTURE: &str = "actual_departure";
pub const COL_SCHEDULED_ARRIVAL: &str = "scheduled_arrival";
pub const COL_ACTUAL_ARRIVAL: &str = "actual_arrival";
pub const COL_FLIGHT_STATUS: &str = "flight_status";
pub const COL_JUSTIFICATION_CODE: &str = "justification_code";

/// Known raw headers and their canonical names.
pub const RAW_HEADER_MAP: [(&str, &str); 12] = [
    ("ICAO Empresa Aérea", COL_AIRLINE),
    ("Número Voo", COL_FLIGHT_NUMBER),
    ("Código Autorização (DI)", COL_AUTHORIZATION_CODE),
    ("Código Tipo Linha", COL_LINE_TYPE),
    ("ICAO Aeródromo Origem", COL_ORIGIN_AIRPORT),
    ("ICAO Aeródromo Destino", COL_DESTINATION_AIRPORT),
    ("Partida Prevista", COL_SCHEDULED_DEPARTURE),
    ("Partida Real", COL_ACTUAL_DEPARTURE),
    ("Chegada Prevista", COL_SCHEDULED_ARRIVAL),
    ("Chegada Real", COL_ACTUAL_ARRIVAL),
    ("Situação Voo", COL_FLIGHT_STATUS),
    ("Código Justificativa", COL_JUSTIFICATION_CODE),
];

/// Canonical record columns in output order.
pub const RECORD_COLUMNS: [&str; 12] = [
    COL_AIRLINE,
    COL_FLIGHT_NUMBER,
    COL_AUTHORIZATION_CODE,
    COL_LINE_TYPE,
    COL_ORIGIN_AIRPORT,
    COL_DESTINATION_AIRPORT,
    COL_SCHEDULED_DEPARTURE,
    COL_ACTUAL_DEPARTURE,
    COL_SCHEDULED_ARRIVAL,
    COL_ACTUAL_ARRIVAL,
    COL_FLIGHT_STATUS,
    COL_JUSTIFICATION_CODE,
];

const REQUIRED_COLUMNS: [&str; 5] = [
    COL_AIRLINE,
    COL_ORIGIN_AIRPORT,
    COL_DESTINATION_AIRPORT,
    COL_SCHEDULED_DEPARTURE,
    COL_ACTUAL_DEPARTURE,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("required column '{column}' is missing")]
    MissingColumn { column: String },
}

/// Untyped table of string cells, as read from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Appends `other` aligning columns by name. Columns present on only one
    /// side are filled with empty cells on the other.
    pub fn append(&mut self, other: RawTable) {
        let mut other_to_self = Vec::with_capacity(other.headers.len());
        for header in &other.headers {
            match self.column_index(header) {
                Some(idx) => other_to_self.push(idx),
                None => {
                    self.headers.push(header.clone());
                    for row in &mut self.rows {
                        row.push(String::new());
                    }
                    other_to_self.push(self.headers.len() - 1);
                }
            }
        }

        let width = self.headers.len();
        for row in other.rows {
            let mut aligned = vec![String::new(); width];
            for (cell, target) in row.into_iter().zip(&other_to_self) {
                aligned[*target] = cell;
            }
            self.rows.push(aligned);
        }
    }
}

/// Undoes a latin-1 decode of UTF-8 bytes. Text that cannot be repaired is
/// returned unchanged.
pub fn repair_header_encoding(raw: &str) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    for ch in raw.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return raw.to_string();
        }
        bytes.push(code as u8);
    }
    String::from_utf8(bytes).unwrap_or_else(|_| raw.to_string())
}

pub fn canonical_column_name(raw: &str) -> String {
    let repaired = repair_header_encoding(raw.trim());
    RAW_HEADER_MAP
        .iter()
        .find(|(known, _)| *known == repaired)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(repaired)
}

pub fn normalize_columns(table: RawTable) -> RawTable {
    let headers: Vec<String> = table
        .headers
        .iter()
        .map(|h| canonical_column_name(h))
        .collect();
    let unmapped: Vec<&String> = headers
        .iter()
        .filter(|h| !RECORD_COLUMNS.contains(&h.as_str()))
        .collect();
    if !unmapped.is_empty() {
        debug!(
            component = "table",
            event = "table.normalize.unmapped",
            columns = ?unmapped
        );
    }

    info!(
        component = "table",
        event = "table.normalize.finish",
        column_count = headers.len(),
        row_count = table.rows.len()
    );

    RawTable {
        headers,
        rows: table.rows,
    }
}

/// Category-valued columns usable as grouping keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryColumn {
    Airline,
    OriginAirport,
    DestinationAirport,
    LineType,
}

impl CategoryColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Airline => COL_AIRLINE,
            Self::OriginAirport => COL_ORIGIN_AIRPORT,
            Self::DestinationAirport => COL_DESTINATION_AIRPORT,
            Self::LineType => COL_LINE_TYPE,
        }
    }
}

/// One observed flight leg with canonical fields. Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub airline: Option<String>,
    pub flight_number: Option<String>,
    pub authorization_code: Option<String>,
    pub line_type: Option<String>,
    pub origin_airport: Option<String>,
    pub destination_airport: Option<String>,
    pub scheduled_departure: Option<String>,
    pub actual_departure: Option<String>,
    pub scheduled_arrival: Option<String>,
    pub actual_arrival: Option<String>,
    pub flight_status: Option<String>,
    pub justification_code: Option<String>,
}

impl FlightRecord {
    /// Builds typed records from a normalized table.
    pub fn from_table(table: &RawTable) -> Result<Vec<FlightRecord>, TableError> {
        for column in REQUIRED_COLUMNS {
            if table.column_index(column).is_none() {
                return Err(TableError::MissingColumn {
                    column: column.to_string(),
                });
            }
        }

        let indices: Vec<Option<usize>> = RECORD_COLUMNS
            .iter()
            .map(|column| table.column_index(column))
            .collect();

        let records = table
            .rows
            .iter()
            .map(|row| {
                let cell = |slot: usize| -> Option<String> {
                    indices[slot]
                        .and_then(|idx| row.get(idx))
                        .map(|v| v.trim())
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                };
                FlightRecord {
                    airline: cell(0),
                    flight_number: cell(1),
                    authorization_code: cell(2),
                    line_type: cell(3),
                    origin_airport: cell(4),
                    destination_airport: cell(5),
                    scheduled_departure: cell(6),
                    actual_departure: cell(7),
                    scheduled_arrival: cell(8),
                    actual_arrival: cell(9),
                    flight_status: cell(10),
                    justification_code: cell(11),
                }
            })
            .collect();

        Ok(records)
    }

    pub fn category(&self, column: CategoryColumn) -> Option<&str> {
        match column {
            CategoryColumn::Airline => self.airline.as_deref(),
            CategoryColumn::OriginAirport => self.origin_airport.as_deref(),
            CategoryColumn::DestinationAirport => self.destination_airport.as_deref(),
            CategoryColumn::LineType => self.line_type.as_deref(),
        }
    }

    /// Values in `RECORD_COLUMNS` order.
    pub fn values(&self) -> [Option<&str>; 12] {
        [
            self.airline.as_deref(),
            self.flight_number.as_deref(),
            self.authorization_code.as_deref(),
            self.line_type.as_deref(),
            self.origin_airport.as_deref(),
            self.destination_airport.as_deref(),
            self.scheduled_departure.as_deref(),
            self.actual_departure.as_deref(),
            self.scheduled_arrival.as_deref(),
            self.actual_arrival.as_deref(),
            self.flight_status.as_deref(),
            self.justification_code.as_deref(),
        ]
    }

    /// Looks up a canonical record column. Outer `None` means the name is not
    /// a record column.
    pub fn field(&self, name: &str) -> Option<Option<&str>> {
        let slot = RECORD_COLUMNS.iter().position(|column| *column == name)?;
        Some(self.values()[slot])
    }
}
