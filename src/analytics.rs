//! Agregación de envíos para el panel de analítica.
//!
//! Todo se recalcula en cada lectura a partir del texto almacenado: el
//! sentimiento no se guarda nunca, así que un cambio en el clasificador se
//! aplica también a los envíos históricos.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::{
    classifier::{sentiment, Sentiment},
    models::{StoredSubmission, SubmissionRecord},
    questions::Category,
};

static STANDALONE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9]+\b").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentCounts {
    pub fn add(&mut self, s: Sentiment) {
        match s {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }

    /// Etiqueta dominante: gana quien supere estrictamente a las otras dos.
    pub fn dominant(&self) -> Sentiment {
        if self.positive > self.negative && self.positive > self.neutral {
            Sentiment::Positive
        } else if self.negative > self.positive && self.negative > self.neutral {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

/// Duración de los envíos en tramos de minutos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeBuckets {
    #[serde(rename = "0-5 min")]
    pub under_five: usize,
    #[serde(rename = "5-10 min")]
    pub five_to_ten: usize,
    #[serde(rename = "10+ min")]
    pub ten_plus: usize,
}

impl TimeBuckets {
    pub fn add(&mut self, elapsed_seconds: u64) {
        match elapsed_seconds / 60 {
            0..=4 => self.under_five += 1,
            5..=9 => self.five_to_ten += 1,
            _ => self.ten_plus += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    NoData,
    MostActive,
    CompletionRate,
    EngagementDepth,
    EngagementGap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Positive,
    Neutral,
    Negative,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub tone: Tone,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    /// Fracción entre 0 y 1; 0 cuando no hay envíos.
    pub completion_rate: f64,
    pub category_counts: Vec<CategoryCount>,
    pub sentiment: SentimentCounts,
    pub time_buckets: TimeBuckets,
    pub average_minutes: u64,
    pub average_answers: f64,
    pub most_engaged: Category,
    pub least_engaged: Category,
    pub insights: Vec<Insight>,
}

impl AggregateStats {
    pub fn completion_percent(&self) -> u32 {
        (self.completion_rate * 100.0).round() as u32
    }

    pub fn count_for(&self, category: Category) -> usize {
        self.category_counts
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}

pub fn aggregate(records: &[SubmissionRecord]) -> AggregateStats {
    let total = records.len();
    let completed = records.iter().filter(|r| r.completed).count();

    let category_counts: Vec<CategoryCount> = Category::ALL
        .iter()
        .map(|&category| CategoryCount {
            category,
            label: category.plural_label(),
            count: records.iter().filter(|r| r.category == category).count(),
        })
        .collect();

    let mut sentiment_counts = SentimentCounts::default();
    let mut answer_count = 0usize;
    for record in records {
        for (_, text) in record.non_empty_answers() {
            sentiment_counts.add(sentiment(text));
            answer_count += 1;
        }
    }

    // Un tiempo de 0 segundos se considera ausente.
    let mut time_buckets = TimeBuckets::default();
    for record in records.iter().filter(|r| r.elapsed_seconds > 0) {
        time_buckets.add(record.elapsed_seconds);
    }

    let (completion_rate, average_minutes, average_answers) = if total == 0 {
        (0.0, 0, 0.0)
    } else {
        let elapsed: u64 = records.iter().map(|r| r.elapsed_seconds).sum();
        (
            completed as f64 / total as f64,
            elapsed / total as u64 / 60,
            answer_count as f64 / total as f64,
        )
    };

    let most_engaged = extreme(&category_counts, |candidate, best| candidate > best);
    let least_engaged = extreme(&category_counts, |candidate, best| candidate < best);

    let mut stats = AggregateStats {
        total,
        completed,
        in_progress: total - completed,
        completion_rate,
        category_counts,
        sentiment: sentiment_counts,
        time_buckets,
        average_minutes,
        average_answers,
        most_engaged,
        least_engaged,
        insights: Vec::new(),
    };
    stats.insights = generate_insights(&stats);
    stats
}

/// Primera categoría (en `Category::ALL`) que ningún posterior supera según `beats`.
fn extreme(counts: &[CategoryCount], beats: impl Fn(usize, usize) -> bool) -> Category {
    let mut best = &counts[0];
    for candidate in &counts[1..] {
        if beats(candidate.count, best.count) {
            best = candidate;
        }
    }
    best.category
}

fn generate_insights(stats: &AggregateStats) -> Vec<Insight> {
    if stats.total == 0 {
        return vec![Insight {
            kind: InsightKind::NoData,
            tone: Tone::Info,
            title: "No Data Yet".to_string(),
            description: "Start collecting survey responses to see insights here.".to_string(),
        }];
    }

    let mut insights = Vec::new();

    let most = stats.count_for(stats.most_engaged);
    if most > 0 {
        let share = (most as f64 / stats.total as f64 * 100.0).round() as u32;
        insights.push(Insight {
            kind: InsightKind::MostActive,
            tone: Tone::Positive,
            title: "Most Active Group".to_string(),
            description: format!(
                "{} are the most engaged with {} responses ({}%).",
                stats.most_engaged.plural_label(),
                most,
                share
            ),
        });
    }

    let rate = stats.completion_percent();
    let tone = if rate >= 80 {
        Tone::Positive
    } else if rate >= 50 {
        Tone::Neutral
    } else {
        Tone::Negative
    };
    let advice = if rate < 80 {
        "Consider shortening the survey or adding incentives."
    } else {
        "Great engagement!"
    };
    insights.push(Insight {
        kind: InsightKind::CompletionRate,
        tone,
        title: "Completion Rate".to_string(),
        description: format!("{}% of surveys are fully completed. {}", rate, advice),
    });

    insights.push(Insight {
        kind: InsightKind::EngagementDepth,
        tone: Tone::Info,
        title: "Engagement Depth".to_string(),
        description: format!(
            "On average, respondents answer {:.1} questions per survey.",
            stats.average_answers
        ),
    });

    if stats.count_for(stats.least_engaged) == 0 {
        insights.push(Insight {
            kind: InsightKind::EngagementGap,
            tone: Tone::Warning,
            title: "Engagement Gap".to_string(),
            description: format!(
                "No responses from {} yet. Consider targeted outreach to this group.",
                stats.least_engaged.plural_label().to_lowercase()
            ),
        });
    }

    insights
}

/// Sentimiento global de un envío, para la tabla de respuestas recientes.
pub fn overall_sentiment(record: &SubmissionRecord) -> Sentiment {
    let mut counts = SentimentCounts::default();
    for (_, text) in record.non_empty_answers() {
        counts.add(sentiment(text));
    }
    counts.dominant()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentResponse {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub category: Category,
    pub answered: usize,
    pub sentiment: Sentiment,
    pub completed: bool,
}

/// Filas de la tabla de respuestas recientes (la entrada ya viene ordenada).
pub fn recent_responses(submissions: &[StoredSubmission], limit: usize) -> Vec<RecentResponse> {
    submissions
        .iter()
        .take(limit)
        .map(|s| RecentResponse {
            id: s.id.clone(),
            created_at: s.created_at,
            category: s.record.category,
            answered: s.record.answers.len(),
            sentiment: overall_sentiment(&s.record),
            completed: s.record.completed,
        })
        .collect()
}

/// Filtro del panel: categoría y rango de fechas inclusivo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsFilter {
    pub category: Option<Category>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl AnalyticsFilter {
    pub fn matches(&self, submission: &StoredSubmission) -> bool {
        let day = submission.created_at.date_naive();
        self.category.map_or(true, |c| submission.record.category == c)
            && self.start_date.map_or(true, |start| day >= start)
            && self.end_date.map_or(true, |end| day <= end)
    }

    pub fn apply(&self, submissions: &[StoredSubmission]) -> Vec<StoredSubmission> {
        submissions
            .iter()
            .filter(|s| self.matches(s))
            .cloned()
            .collect()
    }
}

/// Valoración de calidad frente a probabilidad de recomendación de un cliente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingPoint {
    pub quality: u32,
    pub recommendation: u32,
}

fn standalone_rating(text: &str) -> Option<u32> {
    let found = STANDALONE_NUMBER.find(text)?;
    found
        .as_str()
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=10).contains(n))
}

/// Pares calidad/recomendación de los envíos de clientes.
///
/// La calidad sale de q1/q3 o de respuestas que hablan de satisfacción; la
/// recomendación, de q7 o de respuestas que mencionan "recommend". Sólo se
/// devuelven los envíos que tienen ambas. Si varias respuestas aplican, gana
/// la última.
pub fn customer_rating_points(records: &[SubmissionRecord]) -> Vec<RatingPoint> {
    records
        .iter()
        .filter(|r| r.category == Category::Customer)
        .filter_map(|r| {
            let mut quality = None;
            let mut recommendation = None;
            for (key, value) in &r.answers {
                let Some(num) = standalone_rating(value) else {
                    continue;
                };
                let lower = value.to_lowercase();
                if key.contains("q1") || key.contains("q3") || lower.contains("satisf") {
                    quality = Some(num);
                }
                if key.contains("q7") || lower.contains("recommend") {
                    recommendation = Some(num);
                }
            }
            Some(RatingPoint {
                quality: quality?,
                recommendation: recommendation?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Answers;
    use chrono::{Duration, TimeZone};

    fn record(category: Category, answers: &[(&str, &str)], completed: bool, secs: u64) -> SubmissionRecord {
        let answers: Answers = answers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SubmissionRecord {
            category,
            answers,
            completed,
            elapsed_seconds: secs,
        }
    }

    fn ten_answers() -> Vec<(&'static str, &'static str)> {
        vec![
            ("q1", "9"),
            ("q2_positive", "The search is great"),
            ("q3", "3"),
            ("q4_negative", "bad docs"),
            ("q5", "no"),
            ("q6_positive", "7"),
            ("q7", "8"),
            ("q8_positive", "speed"),
            ("q9", "ok"),
            ("q10", "keep going with the roadmap"),
        ]
    }

    #[test]
    fn empty_input_yields_zeroes() {
        let stats = aggregate(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.completion_rate, 0.0);
        assert_eq!(stats.completion_percent(), 0);
        assert_eq!(stats.average_minutes, 0);
        assert_eq!(stats.category_counts.len(), 3);
        assert!(stats.category_counts.iter().all(|c| c.count == 0));
        assert_eq!(stats.sentiment.total(), 0);
        assert_eq!(stats.time_buckets, TimeBuckets::default());
        assert_eq!(stats.insights.len(), 1);
        assert_eq!(stats.insights[0].kind, InsightKind::NoData);
    }

    #[test]
    fn sentiment_tallies_every_non_empty_answer() {
        let ten = ten_answers();
        let five = &ten[..5];
        let records = vec![
            record(Category::Employee, &ten, true, 100),
            record(Category::Customer, &ten, true, 100),
            record(Category::Stakeholder, five, false, 100),
        ];
        let stats = aggregate(&records);
        assert_eq!(stats.sentiment.total(), 25);

        let with_blank = vec![record(
            Category::Employee,
            &[("q1", "8"), ("q2_positive", "   ")],
            false,
            0,
        )];
        assert_eq!(aggregate(&with_blank).sentiment.total(), 1);
    }

    #[test]
    fn sentiment_counts_follow_the_classifier() {
        let stats = aggregate(&[record(Category::Employee, &ten_answers(), true, 60)]);
        // Positivas: 9, great, 7, 8, "keep going..." (largo); negativas: 3, bad, no, speed;
        // neutral: ok.
        assert_eq!(
            stats.sentiment,
            SentimentCounts {
                positive: 5,
                neutral: 1,
                negative: 4
            }
        );
    }

    #[test]
    fn categories_and_completion_are_counted() {
        let records = vec![
            record(Category::Customer, &[("q1", "8")], true, 30),
            record(Category::Customer, &[("q1", "2")], false, 30),
            record(Category::Employee, &[("q1", "5")], true, 30),
            record(Category::Customer, &[("q1", "7")], true, 30),
        ];
        let stats = aggregate(&records);
        assert_eq!(stats.count_for(Category::Customer), 3);
        assert_eq!(stats.count_for(Category::Employee), 1);
        assert_eq!(stats.count_for(Category::Stakeholder), 0);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.in_progress, 1);
        assert!((stats.completion_rate - 0.75).abs() < 1e-9);
        assert_eq!(stats.completion_percent(), 75);
        assert_eq!(stats.most_engaged, Category::Customer);
        assert_eq!(stats.least_engaged, Category::Stakeholder);
        assert_eq!(
            stats.category_counts.iter().map(|c| c.label).collect::<Vec<_>>(),
            vec!["Employees", "Stakeholders", "Customers"]
        );
    }

    #[test]
    fn time_buckets_skip_missing_durations() {
        let records = vec![
            record(Category::Employee, &[], true, 0),
            record(Category::Employee, &[], true, 299),
            record(Category::Employee, &[], true, 300),
            record(Category::Employee, &[], true, 599),
            record(Category::Employee, &[], true, 600),
            record(Category::Employee, &[], true, 4000),
        ];
        let stats = aggregate(&records);
        assert_eq!(
            stats.time_buckets,
            TimeBuckets {
                under_five: 1,
                five_to_ten: 2,
                ten_plus: 2
            }
        );
        // (0 + 299 + 300 + 599 + 600 + 4000) / 6 / 60 = 16
        assert_eq!(stats.average_minutes, 16);

        let json = serde_json::to_value(stats.time_buckets).unwrap();
        assert_eq!(json["5-10 min"], 2);
    }

    #[test]
    fn ties_resolve_in_category_order() {
        let records = vec![
            record(Category::Customer, &[], true, 0),
            record(Category::Stakeholder, &[], true, 0),
        ];
        let stats = aggregate(&records);
        // Stakeholder y Customer empatan a 1: gana el primero en el orden fijo.
        assert_eq!(stats.most_engaged, Category::Stakeholder);
        assert_eq!(stats.least_engaged, Category::Employee);

        let stats = aggregate(&[]);
        assert_eq!(stats.most_engaged, Category::Employee);
        assert_eq!(stats.least_engaged, Category::Employee);
    }

    #[test]
    fn insights_describe_the_data() {
        let records = vec![
            record(Category::Customer, &[("q1", "8"), ("q2_positive", "price")], true, 60),
            record(Category::Customer, &[("q1", "8")], false, 60),
            record(Category::Employee, &[("q1", "8"), ("q2_positive", "speed"), ("q3", "9")], true, 60),
        ];
        let stats = aggregate(&records);
        let kinds: Vec<_> = stats.insights.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InsightKind::MostActive,
                InsightKind::CompletionRate,
                InsightKind::EngagementDepth,
                InsightKind::EngagementGap
            ]
        );
        assert_eq!(
            stats.insights[0].description,
            "Customers are the most engaged with 2 responses (67%)."
        );
        assert_eq!(stats.insights[1].tone, Tone::Neutral);
        assert_eq!(
            stats.insights[1].description,
            "67% of surveys are fully completed. Consider shortening the survey or adding incentives."
        );
        assert_eq!(
            stats.insights[2].description,
            "On average, respondents answer 2.0 questions per survey."
        );
        assert_eq!(
            stats.insights[3].description,
            "No responses from stakeholders yet. Consider targeted outreach to this group."
        );
    }

    #[test]
    fn completion_tone_thresholds() {
        let all_done: Vec<_> = Category::ALL
            .iter()
            .map(|&c| record(c, &[("q1", "8")], true, 60))
            .collect();
        let stats = aggregate(&all_done);
        assert_eq!(stats.insights[1].tone, Tone::Positive);
        assert!(stats.insights[1].description.ends_with("Great engagement!"));
        // Sin huecos: no hay aviso de categoría vacía.
        assert!(stats
            .insights
            .iter()
            .all(|i| i.kind != InsightKind::EngagementGap));

        let none_done = vec![
            record(Category::Employee, &[], false, 0),
            record(Category::Employee, &[], false, 0),
        ];
        assert_eq!(aggregate(&none_done).insights[1].tone, Tone::Negative);
    }

    #[test]
    fn overall_sentiment_needs_a_strict_majority() {
        let positive = record(Category::Employee, &[("q1", "9"), ("q2_positive", "love it"), ("q3", "2")], true, 0);
        assert_eq!(overall_sentiment(&positive), Sentiment::Positive);

        let tied = record(Category::Employee, &[("q1", "9"), ("q3", "2")], true, 0);
        assert_eq!(overall_sentiment(&tied), Sentiment::Neutral);

        let negative = record(Category::Employee, &[("q1", "1"), ("q3", "2"), ("q5", "ok")], true, 0);
        assert_eq!(overall_sentiment(&negative), Sentiment::Negative);

        let empty = record(Category::Employee, &[], false, 0);
        assert_eq!(overall_sentiment(&empty), Sentiment::Neutral);
    }

    #[test]
    fn filter_by_category_and_inclusive_dates() {
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 23, 59, 30).unwrap();
        let submissions: Vec<_> = [(1, Category::Employee), (5, Category::Customer), (9, Category::Customer)]
            .into_iter()
            .map(|(d, category)| StoredSubmission {
                id: format!("s{d}"),
                created_at: day(d),
                record: record(category, &[], true, 0),
            })
            .collect();

        let all = AnalyticsFilter::default().apply(&submissions);
        assert_eq!(all.len(), 3);

        let customers = AnalyticsFilter {
            category: Some(Category::Customer),
            ..Default::default()
        };
        assert_eq!(customers.apply(&submissions).len(), 2);

        let range = AnalyticsFilter {
            category: None,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 5),
        };
        let ids: Vec<_> = range.apply(&submissions).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["s1", "s5"]);
    }

    #[test]
    fn recent_responses_summarise_each_submission() {
        let now = Utc::now();
        let submissions = vec![
            StoredSubmission {
                id: "new".into(),
                created_at: now,
                record: record(Category::Customer, &[("q1", "9"), ("q2_positive", "great")], true, 60),
            },
            StoredSubmission {
                id: "old".into(),
                created_at: now - Duration::hours(1),
                record: record(Category::Employee, &[("q1", "1")], false, 10),
            },
        ];
        let rows = recent_responses(&submissions, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "new");
        assert_eq!(rows[0].answered, 2);
        assert_eq!(rows[0].sentiment, Sentiment::Positive);
        assert!(rows[0].completed);
    }

    #[test]
    fn rating_points_only_for_customers_with_both_ratings() {
        let records = vec![
            record(
                Category::Customer,
                &[("q1", "8"), ("q3", "6"), ("q7", "9"), ("q9", "I'd recommend it, 10")],
                true,
                0,
            ),
            record(Category::Customer, &[("q1", "8"), ("q7", "no idea")], true, 0),
            record(Category::Employee, &[("q1", "8"), ("q7", "9")], true, 0),
            record(Category::Customer, &[("q1", "it was a 7/10"), ("q7", "20")], true, 0),
            record(Category::Customer, &[("q1", "satisfied, 4"), ("q7", "5")], true, 0),
        ];
        let points = customer_rating_points(&records);
        assert_eq!(
            points,
            vec![
                // q3 pisa a q1; "recommend" en q9 pisa a q7.
                RatingPoint {
                    quality: 6,
                    recommendation: 10
                },
                RatingPoint {
                    quality: 4,
                    recommendation: 5
                },
            ]
        );
    }
}
