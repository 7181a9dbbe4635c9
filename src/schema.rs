//! The fixed master schema and the record shape built over it.

use std::fmt;

use url::Url;

/// Column holding the work's human readable name.
pub const NAME_COLUMN: &str = "piece";
/// Column holding the work's page location. This is the dedup key of the store.
pub const URL_COLUMN: &str = "piece_url";

/// One canonical field of the master schema.
///
/// The canonical names are the flattened header text found on IMSLP work pages,
/// full caption followed by the abbreviated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    WorkTitle,
    Composer,
    CatalogueNumber,
    Key,
    Movements,
    CompositionDate,
    ComposerPeriod,
    PieceStyle,
    Instrumentation,
    AverageDuration,
}

impl Field {
    pub const COUNT: usize = 10;

    /// Every field, in declaration order.
    pub const ALL: [Field; Field::COUNT] = [
        Field::WorkTitle,
        Field::Composer,
        Field::CatalogueNumber,
        Field::Key,
        Field::Movements,
        Field::CompositionDate,
        Field::ComposerPeriod,
        Field::PieceStyle,
        Field::Instrumentation,
        Field::AverageDuration,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::WorkTitle => "Work Title",
            Field::Composer => "Composer",
            Field::CatalogueNumber => "Opus/Catalogue NumberOp./Cat. No.",
            Field::Key => "Key",
            Field::Movements => "Movements/SectionsMov'ts/Sec's",
            Field::CompositionDate => "Year/Date of CompositionY/D of Comp.",
            Field::ComposerPeriod => "Composer Time PeriodComp. Period",
            Field::PieceStyle => "Piece Style",
            Field::Instrumentation => "Instrumentation",
            Field::AverageDuration => "Average DurationAvg. Duration",
        }
    }

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// CSV header of the persisted store: name, location, then every field in order.
pub fn header() -> Vec<&'static str> {
    let mut header = Vec::with_capacity(Field::COUNT + 2);
    header.push(NAME_COLUMN);
    header.push(URL_COLUMN);
    header.extend(Field::ALL.iter().map(|f| f.label()));
    header
}

/// One optional value per schema field. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFields([Option<String>; Field::COUNT]);

impl RecordFields {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.0[field.slot()].as_deref()
    }

    /// Stores `value` under `field`, replacing whatever was there.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.0[field.slot()] = Some(value.into());
    }

    /// Number of fields holding a value.
    pub fn found(&self) -> usize {
        self.0.iter().filter(|v| v.is_some()).count()
    }

    /// `(field, value)` for every schema field in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, Option<&str>)> + '_ {
        Field::ALL.iter().map(move |&f| (f, self.get(f)))
    }
}

/// A record link discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLink {
    pub name: String,
    pub url: Url,
}

/// A harvested work: its identity plus the fields read from its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub url: Url,
    pub fields: RecordFields,
}

impl Record {
    pub fn new(link: RecordLink, fields: RecordFields) -> Self {
        Self {
            name: link.name,
            url: link.url,
            fields,
        }
    }

    /// A record whose page could not be read. It is kept by name and location only.
    pub fn absent(link: RecordLink) -> Self {
        Self::new(link, RecordFields::default())
    }

    /// The CSV row for this record, aligned with [`header`]. Absent fields are empty cells.
    pub fn to_row(&self) -> Vec<&str> {
        let mut row = Vec::with_capacity(Field::COUNT + 2);
        row.push(self.name.as_str());
        row.push(self.url.as_str());
        row.extend(self.fields.iter().map(|(_, v)| v.unwrap_or("")));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_in_slot_order() {
        for (i, field) in Field::ALL.iter().enumerate() {
            assert_eq!(field.slot(), i);
        }
    }

    #[test]
    fn row_lines_up_with_header() {
        let link = RecordLink {
            name: "Sonata".into(),
            url: Url::parse("https://imslp.org/wiki/Sonata").unwrap(),
        };
        let mut fields = RecordFields::default();
        fields.set(Field::Key, "D major");
        let record = Record::new(link, fields);

        let header = header();
        let row = record.to_row();
        assert_eq!(header.len(), row.len());
        let key_col = header.iter().position(|h| *h == "Key").unwrap();
        assert_eq!(row[key_col], "D major");
        assert_eq!(row[1], "https://imslp.org/wiki/Sonata");
        assert_eq!(row.iter().filter(|c| c.is_empty()).count(), Field::COUNT - 1);
    }
}
