//! Transaction bundle construction.
//!
//! Each output record becomes a `MeasureReport` entry whose request is a
//! conditional `PUT MeasureReport?identifier={system}|{value}`, so sending
//! the same record twice replaces rather than duplicates it.

use std::collections::BTreeMap;

use covid_stats_observation_models::{MEASURE_IDENTIFIER_SYSTEM, MeasureType};
use covid_stats_report_models::{NaturalKey, OutputRecord};
use serde_json::{Value, json};

/// Identifier system of organization codes.
pub const ONS_SYSTEM: &str = "https://fhir.gov.uk/Identifier/ONS";

/// Code system of score group codes.
pub const SCORE_SYSTEM: &str = "https://fhir.mayfield-is.co.uk/CodeSystem/covid-score";

/// Identifier system of bundles.
const BUNDLE_ID_SYSTEM: &str = "https://fhir.mayfield-is.co.uk/Id/";

/// `{resource_type}?identifier={system}|{value}`.
#[must_use]
pub fn conditional_url(resource_type: &str, system: &str, value: &str) -> String {
    format!("{resource_type}?identifier={system}|{value}")
}

/// Conditional reference to a measure definition, used when the server
/// did not report an id for it.
#[must_use]
pub fn measure_reference(measure: MeasureType) -> String {
    conditional_url("Measure", MEASURE_IDENTIFIER_SYSTEM, measure.code())
}

/// The `Measure` definition registered for `measure`.
#[must_use]
pub fn measure_resource(measure: MeasureType) -> Value {
    json!({
        "resourceType": "Measure",
        "identifier": [{ "system": MEASURE_IDENTIFIER_SYSTEM, "value": measure.code() }],
        "status": "active",
        "title": measure.title(),
    })
}

/// Converts a record to a `MeasureReport` resource.
#[must_use]
pub fn measure_report(record: &OutputRecord, measure_ref: &str) -> Value {
    let date = record.date.format("%Y-%m-%d").to_string();
    let groups: Vec<Value> = record
        .scores
        .iter()
        .map(|score| {
            let mut group = json!({
                "code": { "coding": [{ "system": SCORE_SYSTEM, "code": score.field.as_ref() }] },
                "measureScore": { "value": score.value },
            });
            if let Some(population) = score.population {
                group["population"] = json!([{ "count": population }]);
            }
            group
        })
        .collect();

    json!({
        "resourceType": "MeasureReport",
        "identifier": [identifier(&record.key)],
        "status": "complete",
        "type": "summary",
        "measure": measure_ref,
        "subject": { "identifier": { "system": ONS_SYSTEM, "value": record.organization } },
        "date": date,
        "period": { "start": date },
        "group": groups,
    })
}

fn identifier(key: &NaturalKey) -> Value {
    json!({ "system": key.system, "value": key.value })
}

/// Builds a transaction bundle upserting every record by natural key.
///
/// `measure_refs` maps each measure to the reference its reports point
/// at; measures without an entry use [`measure_reference`].
#[must_use]
pub fn transaction_bundle(
    records: &[OutputRecord],
    measure_refs: &BTreeMap<MeasureType, String>,
) -> Value {
    let entries: Vec<Value> = records
        .iter()
        .map(|record| {
            let measure_ref = measure_refs
                .get(&record.measure)
                .cloned()
                .unwrap_or_else(|| measure_reference(record.measure));
            json!({
                "fullUrl": format!("urn:uuid:{}", uuid::Uuid::new_v4()),
                "resource": measure_report(record, &measure_ref),
                "request": {
                    "method": "PUT",
                    "url": conditional_url("MeasureReport", &record.key.system, &record.key.value),
                },
            })
        })
        .collect();

    json!({
        "resourceType": "Bundle",
        "identifier": { "system": BUNDLE_ID_SYSTEM, "value": uuid::Uuid::new_v4().to_string() },
        "type": "transaction",
        "entry": entries,
    })
}

/// Returns the statuses of transaction-response entries that are not 2xx.
#[must_use]
pub fn failed_entries(response: &Value) -> Vec<String> {
    response
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.pointer("/response/status").and_then(Value::as_str))
                .filter(|status| !status.trim_start().starts_with('2'))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use covid_stats_report_models::{Score, ScoreField, ScoreValue};

    use super::*;

    fn record() -> OutputRecord {
        let date = NaiveDate::from_ymd_opt(2020, 4, 10).unwrap();
        OutputRecord {
            key: NaturalKey::new(MeasureType::UrgentCareTriage, "E38000232", date),
            measure: MeasureType::UrgentCareTriage,
            organization: "E38000232".to_string(),
            date,
            scores: vec![
                Score {
                    field: ScoreField::Count,
                    value: ScoreValue::Integer(12),
                    population: Some(500_000),
                },
                Score {
                    field: ScoreField::RiskFactor,
                    value: ScoreValue::Decimal(0.02),
                    population: None,
                },
            ],
        }
    }

    #[test]
    fn entries_are_conditional_puts_by_natural_key() {
        let bundle = transaction_bundle(&[record()], &BTreeMap::new());

        assert_eq!(bundle["type"], "transaction");
        let entry = &bundle["entry"][0];
        assert_eq!(entry["request"]["method"], "PUT");
        assert_eq!(
            entry["request"]["url"],
            "MeasureReport?identifier=https://fhir.mayfield-is.co.uk/Measure/NHS111|E38000232-20200410"
        );
        assert!(entry["fullUrl"].as_str().unwrap().starts_with("urn:uuid:"));
    }

    #[test]
    fn report_carries_scores_and_population() {
        let report = measure_report(&record(), "Measure/17");

        assert_eq!(report["measure"], "Measure/17");
        assert_eq!(report["date"], "2020-04-10");
        assert_eq!(report["subject"]["identifier"]["value"], "E38000232");
        assert_eq!(report["group"][0]["code"]["coding"][0]["code"], "count");
        assert_eq!(report["group"][0]["measureScore"]["value"], 12);
        assert_eq!(report["group"][0]["population"][0]["count"], 500_000);
        assert_eq!(report["group"][1]["code"]["coding"][0]["code"], "risk-factor");
        assert!(report["group"][1].get("population").is_none());
    }

    #[test]
    fn falls_back_to_conditional_measure_reference() {
        let bundle = transaction_bundle(&[record()], &BTreeMap::new());
        assert_eq!(
            bundle["entry"][0]["resource"]["measure"],
            "Measure?identifier=https://fhir.mayfield-is.co.uk/MEASURCODE|UEC_COVID"
        );

        let refs = BTreeMap::from([(MeasureType::UrgentCareTriage, "Measure/9".to_string())]);
        let bundle = transaction_bundle(&[record()], &refs);
        assert_eq!(bundle["entry"][0]["resource"]["measure"], "Measure/9");
    }

    #[test]
    fn detects_failed_entries() {
        let response = json!({
            "resourceType": "Bundle",
            "entry": [
                { "response": { "status": "200 OK" } },
                { "response": { "status": "201 Created" } },
                { "response": { "status": "400 Bad Request" } }
            ]
        });
        assert_eq!(failed_entries(&response), vec!["400 Bad Request".to_string()]);
        assert!(failed_entries(&json!({})).is_empty());
    }
}
