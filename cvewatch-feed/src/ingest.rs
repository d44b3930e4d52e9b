// ---------------------------------------------------------------------------
// Feed entry -> CVE record mapping
// ---------------------------------------------------------------------------
//
// Turns raw NVD entries into storable rows. Description prefers the English
// text; score and severity come from the first CVSS v3.1 metric entry,
// falling back to the first v2 entry, with an UNKNOWN sentinel when no
// metric block exists at all.

use cvewatch_db::{DbError, InventoryStore, NewCveRecord};
use tracing::debug;

use crate::client::RawVulnerability;

/// Placeholder stored when an entry has no English description.
const NO_DESCRIPTION: &str = "No description available";

/// Severity sentinel stored when an entry carries no CVSS metric block.
const UNKNOWN_SEVERITY: &str = "UNKNOWN";

/// Map one raw feed entry to a storable record, keyed to the CPE whose
/// lookup produced it. Entries without an id are unusable and yield `None`.
pub fn map_vulnerability(raw: &RawVulnerability, source_cpe: &str) -> Option<NewCveRecord> {
    if raw.id.is_empty() {
        return None;
    }

    let description = raw
        .descriptions
        .iter()
        .find(|d| d.lang == "en")
        .map(|d| d.value.clone())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());

    let (cvss_score, severity) = extract_cvss(raw);

    Some(NewCveRecord {
        cve_id: raw.id.clone(),
        description,
        published: raw.published.clone(),
        last_modified: raw.last_modified.clone(),
        cvss_score,
        severity,
        cpe_related: source_cpe.to_string(),
    })
}

/// Score and severity from the first v3.1 metric entry, else the first v2
/// entry. v2 places `baseSeverity` at the metric level rather than inside
/// `cvssData`, hence the two-step severity lookup.
fn extract_cvss(raw: &RawVulnerability) -> (Option<f64>, Option<String>) {
    let entry = raw
        .metrics
        .cvss_metric_v31
        .first()
        .or_else(|| raw.metrics.cvss_metric_v2.first());

    match entry {
        Some(entry) => {
            let severity = entry
                .cvss_data
                .base_severity
                .clone()
                .or_else(|| entry.base_severity.clone());
            (entry.cvss_data.base_score, severity)
        }
        None => (None, Some(UNKNOWN_SEVERITY.to_string())),
    }
}

/// Map a batch of raw entries and store them. Insert-if-absent: entries
/// whose `cve_id` is already stored are skipped, never refreshed. Returns
/// the number of rows actually inserted.
pub fn ingest_vulnerabilities(
    store: &InventoryStore,
    raw: &[RawVulnerability],
    source_cpe: &str,
) -> Result<usize, DbError> {
    let records: Vec<NewCveRecord> = raw
        .iter()
        .filter_map(|entry| map_vulnerability(entry, source_cpe))
        .collect();

    let inserted = store.insert_cves(&records)?;
    debug!(
        cpe = source_cpe,
        fetched = raw.len(),
        inserted,
        "ingested feed entries"
    );
    Ok(inserted)
}
