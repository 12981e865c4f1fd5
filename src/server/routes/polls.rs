use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    db::{queries::questions, Choice, Question, User},
    server::{app::AppState, auth::CurrentUser, deserializers::lenient_id},
    telemetry::VOTES_CNTR,
};

use super::{ApiError, ApiResponse};

const NO_CHOICE: &str = "You didn't select a choice.";

#[derive(Deserialize)]
struct VoteForm {
    #[serde(default, deserialize_with = "lenient_id")]
    choice: Option<i64>,
}

#[derive(Template, WebTemplate)]
#[template(path = "polls/index.html")]
struct PollsIndexPage {
    current_user: Option<User>,
    latest_questions: Vec<Question>,
}

#[derive(Template, WebTemplate)]
#[template(path = "polls/detail.html")]
struct DetailPage {
    current_user: Option<User>,
    question: Question,
    choices: Vec<Choice>,
    error_message: Option<&'static str>,
}

#[derive(Template, WebTemplate)]
#[template(path = "polls/results.html")]
struct ResultsPage {
    current_user: Option<User>,
    question: Question,
    choices: Vec<Choice>,
}

async fn question_or_404(pool: &SqlitePool, id: i64) -> ApiResponse<Question> {
    questions::get_question(pool, id)
        .await?
        .ok_or(ApiError::NotFound("Question does not exist"))
}

async fn index(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
) -> ApiResponse<PollsIndexPage> {
    Ok(PollsIndexPage {
        current_user,
        latest_questions: questions::get_latest_questions(&pool, Utc::now(), 5).await?,
    })
}

async fn detail(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
    Path(question_id): Path<i64>,
) -> ApiResponse<DetailPage> {
    let question = question_or_404(&pool, question_id).await?;
    Ok(DetailPage {
        current_user,
        choices: questions::get_choices(&pool, question.id).await?,
        question,
        error_message: None,
    })
}

async fn results(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
    Path(question_id): Path<i64>,
) -> ApiResponse<ResultsPage> {
    let question = question_or_404(&pool, question_id).await?;
    Ok(ResultsPage {
        current_user,
        choices: questions::get_choices(&pool, question.id).await?,
        question,
    })
}

/// Redisplays the question form when no valid choice was posted, otherwise
/// records the vote and redirects so a reload does not post twice.
async fn vote(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
    Path(question_id): Path<i64>,
    Form(form): Form<VoteForm>,
) -> ApiResponse<Response> {
    let question = question_or_404(&pool, question_id).await?;

    let voted = match form.choice {
        Some(choice_id) => questions::vote(&pool, question.id, choice_id).await?,
        None => false,
    };
    if !voted {
        tracing::debug!(question_id, choice = ?form.choice, "Vote without a valid choice");
        return Ok(DetailPage {
            current_user,
            choices: questions::get_choices(&pool, question.id).await?,
            question,
            error_message: Some(NO_CHOICE),
        }
        .into_response());
    }

    VOTES_CNTR
        .with_label_values(&[&question.id.to_string()])
        .inc();
    Ok(Redirect::to(&format!("/polls/{}/results", question.id)).into_response())
}

pub fn polls_router(state: AppState) -> Router {
    Router::new()
        .route("/polls", get(index))
        .route("/polls/{question_id}", get(detail))
        .route("/polls/{question_id}/results", get(results))
        .route("/polls/{question_id}/vote", post(vote))
        .with_state(state)
}
