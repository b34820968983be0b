use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::domain::ChangeListEntry;

#[derive(Debug)]
pub enum ChangeListFileError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for ChangeListFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeListFileError::Io(err) => write!(f, "failed to read change list file: {}", err),
            ChangeListFileError::Csv(err) => write!(f, "invalid change list CSV data: {}", err),
        }
    }
}

impl std::error::Error for ChangeListFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChangeListFileError::Io(err) => Some(err),
            ChangeListFileError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ChangeListFileError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ChangeListFileError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Deserialize)]
struct ChangeListRow {
    #[serde(alias = "Area Code", alias = "AreaCode", alias = "area code")]
    area_code: String,
    #[serde(alias = "Phone Number", alias = "PhoneNumber", alias = "phone")]
    phone_number: String,
}

/// Read an upstream change-list export (`area_code,phone_number` per row).
pub fn parse_change_list_csv<R: Read>(
    reader: R,
) -> Result<Vec<ChangeListEntry>, ChangeListFileError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut entries = Vec::new();

    for row in csv_reader.deserialize::<ChangeListRow>() {
        let row = row?;
        if row.area_code.is_empty() && row.phone_number.is_empty() {
            continue;
        }
        entries.push(ChangeListEntry {
            area_code: row.area_code,
            phone: row.phone_number,
        });
    }

    Ok(entries)
}

pub fn parse_change_list_file<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<ChangeListEntry>, ChangeListFileError> {
    let file = std::fs::File::open(path)?;
    parse_change_list_csv(file)
}
