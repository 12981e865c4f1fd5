use chrono::{DateTime, Datelike, Duration, NaiveDate, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Serialize, Deserialize, sqlx::FromRow, Clone, Debug)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
}

impl Question {
    /// Published within the last day and not scheduled for the future.
    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.pub_date && self.pub_date <= now
    }
}

#[derive(Serialize, Deserialize, sqlx::FromRow, Clone, Debug)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
    pub votes: i64,
}

/// Date filter offered on the admin question list.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PubDateFilter {
    #[default]
    Any,
    Today,
    #[serde(rename = "past_7_days")]
    Past7Days,
    ThisMonth,
    ThisYear,
}

impl PubDateFilter {
    pub const ALL: [PubDateFilter; 5] = [
        PubDateFilter::Any,
        PubDateFilter::Today,
        PubDateFilter::Past7Days,
        PubDateFilter::ThisMonth,
        PubDateFilter::ThisYear,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PubDateFilter::Any => "Any date",
            PubDateFilter::Today => "Today",
            PubDateFilter::Past7Days => "Past 7 days",
            PubDateFilter::ThisMonth => "This month",
            PubDateFilter::ThisYear => "This year",
        }
    }

    pub fn as_param(&self) -> &'static str {
        match self {
            PubDateFilter::Any => "any",
            PubDateFilter::Today => "today",
            PubDateFilter::Past7Days => "past_7_days",
            PubDateFilter::ThisMonth => "this_month",
            PubDateFilter::ThisYear => "this_year",
        }
    }

    /// Half-open `[start, end)` range in UTC, `None` for [`PubDateFilter::Any`].
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let today = now.date_naive();
        let midnight = |d: NaiveDate| Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::MIN));
        let tomorrow = midnight(today) + Duration::days(1);
        match self {
            PubDateFilter::Any => None,
            PubDateFilter::Today => Some((midnight(today), tomorrow)),
            PubDateFilter::Past7Days => Some((midnight(today) - Duration::days(7), tomorrow)),
            PubDateFilter::ThisMonth => {
                let first = today.with_day(1)?;
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
                };
                Some((midnight(first), midnight(next)))
            }
            PubDateFilter::ThisYear => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
                let next = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?;
                Some((midnight(first), midnight(next)))
            }
        }
    }
}

// Dates are stored with whole seconds so their text form sorts chronologically.
fn stored(date: DateTime<Utc>) -> DateTime<Utc> {
    date.trunc_subsecs(0)
}

pub async fn create_question(
    pool: &SqlitePool,
    question_text: &str,
    pub_date: DateTime<Utc>,
    choices: &[String],
) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;

    let id = sqlx::query(
        r#"
INSERT INTO questions (question_text, pub_date) VALUES (?1, ?2)
        "#,
    )
    .bind(question_text)
    .bind(stored(pub_date))
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for choice in choices {
        sqlx::query(
            r#"
INSERT INTO choices (question_id, choice_text) VALUES (?1, ?2)
            "#,
        )
        .bind(id)
        .bind(choice)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(id)
}

pub async fn get_question(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Question>> {
    sqlx::query_as::<_, Question>(
        r#"
        SELECT id, question_text, pub_date FROM questions WHERE questions.id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_choices(pool: &SqlitePool, question_id: i64) -> sqlx::Result<Vec<Choice>> {
    sqlx::query_as::<_, Choice>(
        r#"
SELECT id, question_id, choice_text, votes
FROM choices
WHERE question_id = ?1
ORDER BY id
        "#,
    )
    .bind(question_id)
    .fetch_all(pool)
    .await
}

/// The newest questions that are already published at `now`.
pub async fn get_latest_questions(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    limit: i64,
) -> sqlx::Result<Vec<Question>> {
    sqlx::query_as::<_, Question>(
        r#"
SELECT id, question_text, pub_date
FROM questions
WHERE pub_date <= ?1
ORDER BY pub_date DESC, id DESC
LIMIT ?2
        "#,
    )
    .bind(stored(now))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Questions whose text contains `search` ignoring case, within the date
/// filter. SQLite only folds ASCII, so the text match happens here.
pub async fn search_questions(
    pool: &SqlitePool,
    search: Option<&str>,
    filter: PubDateFilter,
    now: DateTime<Utc>,
) -> sqlx::Result<Vec<Question>> {
    let (start, end) = filter.bounds(now).unzip();
    let mut found = sqlx::query_as::<_, Question>(
        r#"
SELECT id, question_text, pub_date
FROM questions
WHERE (?1 IS NULL OR pub_date >= ?1)
  AND (?2 IS NULL OR pub_date < ?2)
ORDER BY pub_date DESC, id DESC
        "#,
    )
    .bind(start.map(stored))
    .bind(end.map(stored))
    .fetch_all(pool)
    .await?;

    if let Some(needle) = search.map(str::to_lowercase) {
        found.retain(|q| q.question_text.to_lowercase().contains(&needle));
    }
    Ok(found)
}

/// Adds one vote to `choice_id` if it belongs to `question_id`. Returns
/// whether a vote was recorded.
pub async fn vote(pool: &SqlitePool, question_id: i64, choice_id: i64) -> sqlx::Result<bool> {
    let affected = sqlx::query(
        r#"
        UPDATE choices SET votes = votes + 1 WHERE id = ?1 AND question_id = ?2
        "#,
    )
    .bind(choice_id)
    .bind(question_id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

pub async fn count_questions(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM questions")
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::establish_in_memory;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn question(pub_date: DateTime<Utc>) -> Question {
        Question {
            id: 1,
            question_text: "What's up?".into(),
            pub_date,
        }
    }

    #[test]
    fn future_question_is_not_recent() {
        let now = at(2024, 3, 10, 12);
        assert!(!question(now + Duration::days(30)).was_published_recently(now));
    }

    #[test]
    fn old_question_is_not_recent() {
        let now = at(2024, 3, 10, 12);
        let pub_date = now - Duration::days(1) - Duration::seconds(1);
        assert!(!question(pub_date).was_published_recently(now));
    }

    #[test]
    fn question_from_today_is_recent() {
        let now = at(2024, 3, 10, 12);
        let pub_date = now - Duration::hours(23) - Duration::minutes(59);
        assert!(question(pub_date).was_published_recently(now));
    }

    #[test]
    fn month_bounds_wrap_december() {
        let (start, end) = PubDateFilter::ThisMonth.bounds(at(2023, 12, 31, 23)).unwrap();
        assert_eq!(start, at(2023, 12, 1, 0));
        assert_eq!(end, at(2024, 1, 1, 0));
        assert!(PubDateFilter::Any.bounds(at(2023, 12, 31, 23)).is_none());
    }

    #[tokio::test]
    async fn vote_is_scoped_to_question() {
        let pool = establish_in_memory().await.unwrap();
        let now = Utc::now();
        let first = create_question(&pool, "Best language?", now, &["Rust".into(), "Python".into()])
            .await
            .unwrap();
        let second = create_question(&pool, "Best editor?", now, &["vim".into()])
            .await
            .unwrap();
        let first_choices = get_choices(&pool, first).await.unwrap();
        let other_choice = get_choices(&pool, second).await.unwrap()[0].id;

        assert!(vote(&pool, first, first_choices[0].id).await.unwrap());
        assert!(vote(&pool, first, first_choices[0].id).await.unwrap());
        assert!(!vote(&pool, first, other_choice).await.unwrap());

        let choices = get_choices(&pool, first).await.unwrap();
        assert_eq!(choices[0].votes, 2);
        assert_eq!(choices[1].votes, 0);
        assert_eq!(get_choices(&pool, second).await.unwrap()[0].votes, 0);
    }

    #[tokio::test]
    async fn latest_questions_skip_future_ones() {
        let pool = establish_in_memory().await.unwrap();
        let now = Utc::now();
        create_question(&pool, "Past", now - Duration::days(2), &[]).await.unwrap();
        create_question(&pool, "Recent", now - Duration::hours(1), &[]).await.unwrap();
        create_question(&pool, "Future", now + Duration::days(2), &[]).await.unwrap();

        let latest = get_latest_questions(&pool, now, 5).await.unwrap();
        let texts: Vec<_> = latest.iter().map(|q| q.question_text.as_str()).collect();
        assert_eq!(texts, ["Recent", "Past"]);
    }

    #[tokio::test]
    async fn search_matches_text_and_date_range() {
        let pool = establish_in_memory().await.unwrap();
        let now = at(2024, 3, 10, 12);
        create_question(&pool, "What's new?", now - Duration::hours(2), &[]).await.unwrap();
        create_question(&pool, "What is old?", now - Duration::days(40), &[]).await.unwrap();
        create_question(&pool, "Favourite colour", now - Duration::days(3), &[]).await.unwrap();

        let found = search_questions(&pool, Some("WHAT"), PubDateFilter::Any, now)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let found = search_questions(&pool, None, PubDateFilter::Past7Days, now)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let found = search_questions(&pool, Some("what"), PubDateFilter::Today, now)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question_text, "What's new?");
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() {
        let pool = establish_in_memory().await.unwrap();
        let now = Utc::now();
        create_question(&pool, "Projets pour l'été", now, &[]).await.unwrap();
        create_question(&pool, "Projets pour demain", now, &[]).await.unwrap();

        let found = search_questions(&pool, Some("ÉTÉ"), PubDateFilter::Any, now)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question_text, "Projets pour l'été");
    }
}
