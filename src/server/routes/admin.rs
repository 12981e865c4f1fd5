use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    db::{
        queries::{
            categories, pages,
            questions::{self, PubDateFilter},
            users,
        },
        Category, PageListing, Question, User,
    },
    server::{app::AppState, auth::RequireStaff, deserializers::empty_string_as_none},
};

use super::{form_errors, ApiResponse};

const INLINE_CHOICES: usize = 3;
const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Deserialize, Default)]
struct QuestionsQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    q: Option<String>,
    #[serde(default)]
    pub_date: PubDateFilter,
}

#[derive(Deserialize, Validate, Default)]
struct QuestionForm {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Please enter the question, at most 200 characters."
    ))]
    question_text: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub_date: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 200, message = "Choices are at most 200 characters."))]
    choice_1: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 200, message = "Choices are at most 200 characters."))]
    choice_2: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 200, message = "Choices are at most 200 characters."))]
    choice_3: Option<String>,
}

impl QuestionForm {
    fn choices(&self) -> Vec<String> {
        [&self.choice_1, &self.choice_2, &self.choice_3]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    fn choice_values(&self) -> Vec<String> {
        [&self.choice_1, &self.choice_2, &self.choice_3]
            .into_iter()
            .map(|c| c.clone().unwrap_or_default())
            .collect()
    }
}

fn parse_pub_date(value: Option<&str>, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    match value {
        None => Ok(now),
        Some(value) => NaiveDateTime::parse_from_str(value, DATETIME_INPUT_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|_| "Please enter the publication date as YYYY-MM-DDTHH:MM.".to_owned()),
    }
}

struct QuestionRow {
    question: Question,
    recently: bool,
}

struct FilterOption {
    param: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/index.html")]
struct AdminIndexPage {
    current_user: Option<User>,
    categories: i64,
    pages: i64,
    questions: i64,
    users: i64,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/categories.html")]
struct AdminCategoriesPage {
    current_user: Option<User>,
    categories: Vec<Category>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/pages.html")]
struct AdminPagesPage {
    current_user: Option<User>,
    pages: Vec<PageListing>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/questions.html")]
struct AdminQuestionsPage {
    current_user: Option<User>,
    search: String,
    filters: Vec<FilterOption>,
    rows: Vec<QuestionRow>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/question_new.html")]
struct AdminNewQuestionPage {
    current_user: Option<User>,
    question_text: String,
    pub_date: String,
    choices: Vec<String>,
    errors: Vec<String>,
}

async fn index(
    State(pool): State<SqlitePool>,
    RequireStaff(user): RequireStaff,
) -> ApiResponse<AdminIndexPage> {
    Ok(AdminIndexPage {
        current_user: Some(user),
        categories: categories::count_categories(&pool).await?,
        pages: pages::count_pages(&pool).await?,
        questions: questions::count_questions(&pool).await?,
        users: users::count_users(&pool).await?,
    })
}

async fn categories_list(
    State(pool): State<SqlitePool>,
    RequireStaff(user): RequireStaff,
) -> ApiResponse<AdminCategoriesPage> {
    Ok(AdminCategoriesPage {
        current_user: Some(user),
        categories: categories::get_all_categories(&pool).await?,
    })
}

async fn pages_list(
    State(pool): State<SqlitePool>,
    RequireStaff(user): RequireStaff,
) -> ApiResponse<AdminPagesPage> {
    Ok(AdminPagesPage {
        current_user: Some(user),
        pages: pages::get_page_listings(&pool).await?,
    })
}

async fn questions_list(
    State(pool): State<SqlitePool>,
    RequireStaff(user): RequireStaff,
    Query(query): Query<QuestionsQuery>,
) -> ApiResponse<AdminQuestionsPage> {
    let now = Utc::now();
    let found = questions::search_questions(&pool, query.q.as_deref(), query.pub_date, now).await?;
    Ok(AdminQuestionsPage {
        current_user: Some(user),
        search: query.q.unwrap_or_default(),
        filters: PubDateFilter::ALL
            .iter()
            .map(|f| FilterOption {
                param: f.as_param(),
                label: f.label(),
                selected: *f == query.pub_date,
            })
            .collect(),
        rows: found
            .into_iter()
            .map(|question| QuestionRow {
                recently: question.was_published_recently(now),
                question,
            })
            .collect(),
    })
}

async fn new_question_form(RequireStaff(user): RequireStaff) -> AdminNewQuestionPage {
    AdminNewQuestionPage {
        current_user: Some(user),
        question_text: String::new(),
        pub_date: String::new(),
        choices: vec![String::new(); INLINE_CHOICES],
        errors: vec![],
    }
}

async fn create_question(
    State(pool): State<SqlitePool>,
    RequireStaff(user): RequireStaff,
    Form(form): Form<QuestionForm>,
) -> ApiResponse<Response> {
    let form = QuestionForm {
        question_text: form.question_text.trim().to_owned(),
        ..form
    };
    let mut errors = match form.validate() {
        Ok(()) => vec![],
        Err(e) => form_errors(&e),
    };
    let pub_date = match parse_pub_date(form.pub_date.as_deref(), Utc::now()) {
        Ok(date) => Some(date),
        Err(message) => {
            errors.push(message);
            None
        }
    };
    let Some(pub_date) = pub_date.filter(|_| errors.is_empty()) else {
        return Ok(AdminNewQuestionPage {
            current_user: Some(user),
            question_text: form.question_text.clone(),
            pub_date: form.pub_date.clone().unwrap_or_default(),
            choices: form.choice_values(),
            errors,
        }
        .into_response());
    };

    let id = questions::create_question(&pool, &form.question_text, pub_date, &form.choices()).await?;
    tracing::info!(id, staff = %user.username, "Question created");
    Ok(Redirect::to("/admin/questions").into_response())
}

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin", get(index))
        .route("/admin/categories", get(categories_list))
        .route("/admin/pages", get(pages_list))
        .route("/admin/questions", get(questions_list))
        .route(
            "/admin/questions/new",
            get(new_question_form).post(create_question),
        )
        .with_state(state)
}
