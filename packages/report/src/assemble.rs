//! Turns aggregates and indicators into output records.

use covid_stats_indicator::{Indicator, Indicators, RunningTotals};
use covid_stats_location::LocationRegistry;
use covid_stats_location_models::LocationNode;
use covid_stats_observation_models::{DailyStat, MeasureType};
use covid_stats_report_models::{NaturalKey, OutputRecord, Score, ScoreField, ScoreValue};
use covid_stats_rollup::AggregateStats;

/// Emits one record per (node, date, measure) for every measure the
/// aggregate carries, ordered by (organization, date, measure).
///
/// Aggregates whose node is not in the registry are skipped.
#[must_use]
pub fn assemble(
    aggregates: &AggregateStats,
    indicators: &Indicators,
    registry: &LocationRegistry,
) -> Vec<OutputRecord> {
    let empty = Indicator::default();
    let mut records = Vec::new();

    for (key, aggregate) in aggregates {
        let Some(node) = registry.get(&key.organization) else {
            continue;
        };
        let indicator = indicators.get(key).unwrap_or(&empty);

        for measure in aggregate.measures() {
            records.push(OutputRecord {
                key: NaturalKey::new(measure, &key.organization, key.date),
                measure,
                organization: key.organization.clone(),
                date: key.date,
                scores: scores(measure, aggregate, node, indicator),
            });
        }
    }

    log::info!("Assembled {} output records", records.len());
    records
}

fn scores(
    measure: MeasureType,
    aggregate: &DailyStat,
    node: &LocationNode,
    indicator: &Indicator,
) -> Vec<Score> {
    let mut scores = vec![Score {
        field: ScoreField::Count,
        value: ScoreValue::Integer(aggregate.primary(measure)),
        population: Some(node.population),
    }];

    let rates = indicator.rates.get(&measure).copied().unwrap_or_default();
    push_decimal(&mut scores, ScoreField::PerMillion, rates.per_million);
    push_decimal(&mut scores, ScoreField::PerHectare, rates.per_hectare);
    push_decimal(&mut scores, ScoreField::HealthIndex, node.health_index);
    push_decimal(&mut scores, ScoreField::DeprivationIndex, node.deprivation_index);

    if measure == MeasureType::UrgentCareTriage {
        push_integer(&mut scores, ScoreField::DailyOnline, Some(aggregate.online_total()));
        push_decimal(&mut scores, ScoreField::CostEstimate, indicator.cost_estimate);
        push_decimal(&mut scores, ScoreField::RiskFactor, indicator.risk_factor);

        if let Some(RunningTotals {
            triage,
            male_triage,
            female_triage,
            online,
            male_online,
            female_online,
        }) = indicator.running_totals
        {
            push_integer(&mut scores, ScoreField::TriageTotal, Some(triage));
            push_integer(&mut scores, ScoreField::MaleTriageTotal, Some(male_triage));
            push_integer(&mut scores, ScoreField::FemaleTriageTotal, Some(female_triage));
            push_integer(&mut scores, ScoreField::OnlineTotal, Some(online));
            push_integer(&mut scores, ScoreField::MaleOnlineTotal, Some(male_online));
            push_integer(&mut scores, ScoreField::FemaleOnlineTotal, Some(female_online));
        }
    }

    scores
}

fn push_decimal(scores: &mut Vec<Score>, field: ScoreField, value: Option<f64>) {
    if let Some(value) = value.filter(|v| v.is_finite()) {
        scores.push(Score {
            field,
            value: ScoreValue::Decimal(value),
            population: None,
        });
    }
}

fn push_integer(scores: &mut Vec<Score>, field: ScoreField, value: Option<u64>) {
    if let Some(value) = value {
        scores.push(Score {
            field,
            value: ScoreValue::Integer(value),
            population: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use covid_stats_indicator::compute_indicators;
    use covid_stats_location::MergeTable;
    use covid_stats_location_models::LocationLevel;
    use covid_stats_observation_models::{Counter, StatKey};

    use super::*;

    fn d() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 4, 10).unwrap()
    }

    fn registry() -> LocationRegistry {
        let mut node = LocationNode::new("E92000001", "England", None, LocationLevel::Country);
        node.population = 1_000_000;
        node.health_index = Some(0.5);
        LocationRegistry::new(vec![node], MergeTable::default())
    }

    #[test]
    fn one_record_per_measure_in_order() {
        let registry = registry();
        let mut stat = DailyStat::default();
        stat.add(Counter::Deaths, 3);
        stat.add(Counter::Cases, 10);
        stat.add(Counter::FemaleTriage, 4);
        let mut aggregates = AggregateStats::new();
        aggregates.insert(StatKey::new("E92000001", d()), stat);

        let indicators = compute_indicators(&aggregates, &registry);
        let records = assemble(&aggregates, &indicators, &registry);

        let measures: Vec<MeasureType> = records.iter().map(|r| r.measure).collect();
        assert_eq!(
            measures,
            vec![
                MeasureType::CaseSurveillance,
                MeasureType::Mortality,
                MeasureType::UrgentCareTriage
            ]
        );
        assert_eq!(records[1].score(ScoreField::Count), Some(ScoreValue::Integer(3)));
        assert_eq!(records[0].scores[0].population, Some(1_000_000));
    }

    #[test]
    fn score_fields_follow_the_fixed_order() {
        let registry = registry();
        let mut stat = DailyStat::default();
        stat.add(Counter::MaleTriage, 2);
        stat.add(Counter::MaleOnline, 1);
        let mut aggregates = AggregateStats::new();
        aggregates.insert(StatKey::new("E92000001", d()), stat);

        let indicators = compute_indicators(&aggregates, &registry);
        let records = assemble(&aggregates, &indicators, &registry);
        let fields: Vec<ScoreField> = records[0].scores.iter().map(|s| s.field).collect();

        assert_eq!(
            fields,
            vec![
                ScoreField::Count,
                ScoreField::PerMillion,
                ScoreField::HealthIndex,
                ScoreField::DailyOnline,
                ScoreField::TriageTotal,
                ScoreField::MaleTriageTotal,
                ScoreField::FemaleTriageTotal,
                ScoreField::OnlineTotal,
                ScoreField::MaleOnlineTotal,
                ScoreField::FemaleOnlineTotal,
            ]
        );
        let per_million = records[0].score(ScoreField::PerMillion).unwrap().as_f64();
        assert!((per_million - 2.0).abs() < 1e-12);
    }
}
