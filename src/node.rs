//! The 64-byte fixed node record and its materialized, language-resolved
//! view (C3, §3, §4.3).

use crate::arena::Arena;
use crate::error::LoadError;
use crate::tables;

/// On-disk size of a single node record, in bytes.
pub const RECORD_SIZE: usize = 64;

/// A zero-copy view over one 64-byte node record.
///
/// Field layout (little-endian, offsets relative to the start of the
/// record):
///
/// | Offset | Size | Field |
/// |---|---|---|
/// | 0 | 8 | `id` (i64) |
/// | 8 | 4 | `name_offset` (u32) |
/// | 12 | 4 | `region_offset` (u32) |
/// | 16 | 4 | `population` (u32) |
/// | 20 | 2 | `rank` (u16) |
/// | 22 | 2 | `timezone` (u16) |
/// | 24 | 1 | `country` (u8) |
/// | 25-27 | 3 | padding, zero |
/// | 28 | 4 | `center.lat` (f32) |
/// | 32 | 4 | `center.lng` (f32) |
/// | 36 | 4 | `bbox.min_lat` (f32) |
/// | 40 | 4 | `bbox.min_lng` (f32) |
/// | 44 | 4 | `bbox.max_lat` (f32) |
/// | 48 | 4 | `bbox.max_lng` (f32) |
/// | 52-63 | 12 | padding, zero |
#[derive(Debug, Clone, Copy)]
pub struct NodeRecord {
    /// External stable identifier.
    pub id: i64,
    /// Byte offset of the name-group in the string arena.
    pub name_offset: u32,
    /// Byte offset of the region-group in the string arena.
    pub region_offset: u32,
    /// Population, or 0 if unknown.
    pub population: u32,
    /// Build-time relevance score. Larger is better.
    pub rank: u16,
    /// Index into [`tables::TIMEZONES`].
    pub timezone: u16,
    /// Index into [`tables::COUNTRIES`].
    pub country: u8,
    /// Latitude/longitude center point.
    pub center: (f32, f32),
    /// Bounding box as `(min_lat, min_lng, max_lat, max_lng)`.
    pub bounding_box: (f32, f32, f32, f32),
}

impl NodeRecord {
    /// Decodes a single record from exactly [`RECORD_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), RECORD_SIZE);
        let id = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let name_offset = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let region_offset = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let population = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        let rank = u16::from_le_bytes(bytes[20..22].try_into().unwrap());
        let timezone = u16::from_le_bytes(bytes[22..24].try_into().unwrap());
        let country = bytes[24];
        let lat = f32::from_le_bytes(bytes[28..32].try_into().unwrap());
        let lng = f32::from_le_bytes(bytes[32..36].try_into().unwrap());
        let min_lat = f32::from_le_bytes(bytes[36..40].try_into().unwrap());
        let min_lng = f32::from_le_bytes(bytes[40..44].try_into().unwrap());
        let max_lat = f32::from_le_bytes(bytes[44..48].try_into().unwrap());
        let max_lng = f32::from_le_bytes(bytes[48..52].try_into().unwrap());

        Self {
            id,
            name_offset,
            region_offset,
            population,
            rank,
            timezone,
            country,
            center: (lat, lng),
            bounding_box: (min_lat, min_lng, max_lat, max_lng),
        }
    }

    /// Encodes this record to exactly [`RECORD_SIZE`] bytes, zero-padded.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..8].copy_from_slice(&self.id.to_le_bytes());
        out[8..12].copy_from_slice(&self.name_offset.to_le_bytes());
        out[12..16].copy_from_slice(&self.region_offset.to_le_bytes());
        out[16..20].copy_from_slice(&self.population.to_le_bytes());
        out[20..22].copy_from_slice(&self.rank.to_le_bytes());
        out[22..24].copy_from_slice(&self.timezone.to_le_bytes());
        out[24] = self.country;
        out[28..32].copy_from_slice(&self.center.0.to_le_bytes());
        out[32..36].copy_from_slice(&self.center.1.to_le_bytes());
        out[36..40].copy_from_slice(&self.bounding_box.0.to_le_bytes());
        out[40..44].copy_from_slice(&self.bounding_box.1.to_le_bytes());
        out[44..48].copy_from_slice(&self.bounding_box.2.to_le_bytes());
        out[48..52].copy_from_slice(&self.bounding_box.3.to_le_bytes());
        out
    }
}

/// Read-only view over the fixed node array, backed by mmap'd or owned bytes.
pub struct NodeTable<'a> {
    data: &'a [u8],
}

impl<'a> NodeTable<'a> {
    /// Wraps a byte slice whose length must be a multiple of [`RECORD_SIZE`].
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert_eq!(data.len() % RECORD_SIZE, 0);
        Self { data }
    }

    /// Number of records in the table.
    pub fn len(&self) -> usize {
        self.data.len() / RECORD_SIZE
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the record at `document_id`, or `None` if out of range.
    pub fn get(&self, document_id: u32) -> Option<NodeRecord> {
        let start = (document_id as usize).checked_mul(RECORD_SIZE)?;
        let end = start.checked_add(RECORD_SIZE)?;
        let bytes = self.data.get(start..end)?;
        Some(NodeRecord::decode(bytes))
    }
}

/// A fully materialized, language-resolved result record.
///
/// This is the type returned by every public query operation in
/// [`crate::engine`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceResult {
    /// External stable identifier.
    pub id: i64,
    /// Dense document id (array position) this result was materialized from.
    pub document_id: u32,
    /// Name resolved to the requested language column (or canonical).
    pub name: String,
    /// Region name resolved to the requested language column.
    pub region: String,
    /// Sub-region name resolved to the requested language column.
    pub sub_region: String,
    /// ISO-3166-1 alpha-2 country code, or `""` if unknown.
    pub country: &'static str,
    /// IANA timezone identifier, or `"Etc/UTC"` if unknown.
    pub timezone: &'static str,
    /// Population, or 0 if unknown.
    pub population: u32,
    /// Effective rank: build-time rank plus any query-time bonus (§4.7).
    /// Never written back to the stored record.
    pub rank: i32,
    /// `(lat, lng)` center point.
    pub center: (f32, f32),
    /// `(min_lat, min_lng, max_lat, max_lng)` bounding box.
    pub bounding_box: (f32, f32, f32, f32),
}

/// Resolves a language tag to a 1-based column index via the header's
/// language table. An unknown tag resolves to column 0 (canonical name),
/// per §4.3 step 2.
pub fn resolve_language_column(languages: &[String], tag: &str) -> usize {
    languages
        .iter()
        .position(|l| l.eq_ignore_ascii_case(tag))
        .map(|pos| pos + 1)
        .unwrap_or(0)
}

/// Materializes a [`PlaceResult`] for `document_id` at the given language
/// column, per the steps in §4.3.
pub fn materialize(
    nodes: &NodeTable<'_>,
    strings: &Arena<'_>,
    document_id: u32,
    column: usize,
) -> Result<Option<PlaceResult>, LoadError> {
    let Some(record) = nodes.get(document_id) else {
        return Ok(None);
    };

    let names = strings.get(record.name_offset)?;
    let name = names.get(column).or_else(|| names.first()).copied().unwrap_or("");

    let regions = strings.get(record.region_offset)?;
    let region = regions.get(2 * column).copied().unwrap_or("");
    let sub_region = regions.get(2 * column + 1).copied().unwrap_or("");

    Ok(Some(PlaceResult {
        id: record.id,
        document_id,
        name: name.to_string(),
        region: region.to_string(),
        sub_region: sub_region.to_string(),
        country: tables::country_name(record.country),
        timezone: tables::timezone_name(record.timezone),
        population: record.population,
        rank: record.rank as i32,
        center: record.center,
        bounding_box: record.bounding_box,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> NodeRecord {
        NodeRecord {
            id: 42,
            name_offset: 0,
            region_offset: 100,
            population: 3_700_000,
            rank: 900,
            timezone: 3,
            country: 7,
            center: (52.52, 13.40),
            bounding_box: (52.3, 13.0, 52.7, 13.8),
        }
    }

    #[test]
    fn record_round_trips_through_encode_decode() {
        let record = sample_record();
        let bytes = record.encode();
        assert_eq!(bytes.len(), RECORD_SIZE);
        let decoded = NodeRecord::decode(&bytes);
        assert_eq!(decoded.id, record.id);
        assert_eq!(decoded.name_offset, record.name_offset);
        assert_eq!(decoded.region_offset, record.region_offset);
        assert_eq!(decoded.population, record.population);
        assert_eq!(decoded.rank, record.rank);
        assert_eq!(decoded.timezone, record.timezone);
        assert_eq!(decoded.country, record.country);
        assert_eq!(decoded.center, record.center);
        assert_eq!(decoded.bounding_box, record.bounding_box);
    }

    #[test]
    fn padding_bytes_are_zero() {
        let bytes = sample_record().encode();
        assert_eq!(&bytes[25..28], &[0, 0, 0]);
        assert_eq!(&bytes[52..64], &[0u8; 12]);
    }

    #[test]
    fn node_table_indexes_records_by_position() {
        let a = sample_record();
        let mut b = sample_record();
        b.id = 99;
        let mut data = Vec::new();
        data.extend_from_slice(&a.encode());
        data.extend_from_slice(&b.encode());

        let table = NodeTable::new(&data);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().id, 42);
        assert_eq!(table.get(1).unwrap().id, 99);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn resolve_language_column_unknown_tag_is_canonical() {
        let langs = vec!["en".to_string(), "de".to_string()];
        assert_eq!(resolve_language_column(&langs, "en"), 1);
        assert_eq!(resolve_language_column(&langs, "de"), 2);
        assert_eq!(resolve_language_column(&langs, "fr"), 0);
    }

    fn encode_group(strings: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        for s in strings {
            out.extend_from_slice(&(s.len() as u16).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        out
    }

    #[test]
    fn materialize_resolves_name_and_region_for_language_column() {
        let mut record = sample_record();
        record.name_offset = 0;
        let names = encode_group(&["Berlin", "Berlin", "Berlin"]);
        record.region_offset = names.len() as u32;
        let regions = encode_group(&["Berlin", "", "Berlin", "", "Berlin", ""]);

        let mut data = Vec::new();
        data.extend_from_slice(&names);
        data.extend_from_slice(&regions);

        let node_bytes = record.encode();
        let nodes = NodeTable::new(&node_bytes);
        let arena = Arena::new(&data);

        let result = materialize(&nodes, &arena, 0, 1).unwrap().unwrap();
        assert_eq!(result.name, "Berlin");
        assert_eq!(result.region, "Berlin");
        assert_eq!(result.country, tables::country_name(7));
        assert_eq!(result.timezone, tables::timezone_name(3));
    }

    #[test]
    fn materialize_out_of_range_document_id_is_none() {
        let node_bytes = sample_record().encode();
        let nodes = NodeTable::new(&node_bytes);
        let arena = Arena::new(&[]);
        assert!(materialize(&nodes, &arena, 5, 0).unwrap().is_none());
    }
}
