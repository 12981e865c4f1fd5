use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    db::{
        queries::{self, categories, pages},
        Category, Page, User,
    },
    server::{
        app::AppState,
        auth::{CurrentUser, RequireUser},
        deserializers::lenient_id,
    },
    telemetry::{CATEGORY_LIKES_CNTR, PAGE_VISITS_CNTR},
};

use super::{form_errors, ApiError, ApiResponse};

const CATEGORY_EXISTS: &str = "Category with this name already exists.";

#[derive(Deserialize, Validate, Default)]
struct CategoryForm {
    #[validate(length(
        min = 1,
        max = 128,
        message = "Please enter the category name, at most 128 characters."
    ))]
    name: String,
}

#[derive(Deserialize, Validate, Default)]
struct PageForm {
    #[validate(length(
        min = 1,
        max = 128,
        message = "Please enter the title of the page, at most 128 characters."
    ))]
    title: String,
    #[validate(
        length(max = 200, message = "The URL must be at most 200 characters."),
        url(message = "Please enter a valid URL.")
    )]
    url: String,
}

impl PageForm {
    /// Trims the input and prefixes scheme-less URLs with `http://`.
    fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_owned(),
            url: normalize_url(&self.url),
        }
    }
}

pub(crate) fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        url.to_owned()
    } else {
        format!("http://{url}")
    }
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default, deserialize_with = "lenient_id")]
    page_id: Option<i64>,
}

#[derive(Deserialize)]
struct CategoryQuery {
    #[serde(default, deserialize_with = "lenient_id")]
    category_id: Option<i64>,
}

#[derive(Template, WebTemplate)]
#[template(path = "rango/category.html")]
struct CategoryPage {
    current_user: Option<User>,
    category: Option<Category>,
    pages: Vec<Page>,
}

#[derive(Template, WebTemplate)]
#[template(path = "rango/add_category.html")]
struct AddCategoryPage {
    current_user: Option<User>,
    form: CategoryForm,
    errors: Vec<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "rango/add_page.html")]
struct AddPagePage {
    current_user: Option<User>,
    category: Category,
    form: PageForm,
    errors: Vec<String>,
}

async fn show_category(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
    Path(slug): Path<String>,
) -> ApiResponse<CategoryPage> {
    let Some(mut category) = categories::get_category_by_slug(&pool, &slug).await? else {
        return Ok(CategoryPage {
            current_user,
            category: None,
            pages: vec![],
        });
    };
    if let Some(views) = categories::add_category_view(&pool, category.id).await? {
        category.views = views;
    }
    let pages = pages::get_pages_for_category(&pool, category.id).await?;
    Ok(CategoryPage {
        current_user,
        category: Some(category),
        pages,
    })
}

async fn add_category_form(CurrentUser(current_user): CurrentUser) -> AddCategoryPage {
    AddCategoryPage {
        current_user,
        form: CategoryForm::default(),
        errors: vec![],
    }
}

async fn add_category(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
    Form(form): Form<CategoryForm>,
) -> ApiResponse<Response> {
    let form = CategoryForm {
        name: form.name.trim().to_owned(),
    };
    let rerender = |form, errors| {
        AddCategoryPage {
            current_user,
            form,
            errors,
        }
        .into_response()
    };

    if let Err(errors) = form.validate() {
        return Ok(rerender(form, form_errors(&errors)));
    }
    if categories::slugify(&form.name).is_empty() {
        let errors = vec!["The category name must contain letters or digits.".to_owned()];
        return Ok(rerender(form, errors));
    }
    if categories::category_name_taken(&pool, &form.name).await? {
        return Ok(rerender(form, vec![CATEGORY_EXISTS.to_owned()]));
    }
    match categories::create_category(&pool, &form.name).await {
        Ok(id) => {
            tracing::info!(id, name = %form.name, "Category created");
            Ok(Redirect::to("/rango/").into_response())
        }
        Err(e) if queries::is_unique_violation(&e) => {
            Ok(rerender(form, vec![CATEGORY_EXISTS.to_owned()]))
        }
        Err(e) => Err(e.into()),
    }
}

async fn add_page_form(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
    Path(slug): Path<String>,
) -> ApiResponse<Response> {
    let Some(category) = categories::get_category_by_slug(&pool, &slug).await? else {
        return Ok(Redirect::to("/rango/").into_response());
    };
    Ok(AddPagePage {
        current_user,
        category,
        form: PageForm::default(),
        errors: vec![],
    }
    .into_response())
}

async fn add_page(
    State(pool): State<SqlitePool>,
    CurrentUser(current_user): CurrentUser,
    Path(slug): Path<String>,
    Form(form): Form<PageForm>,
) -> ApiResponse<Response> {
    let Some(category) = categories::get_category_by_slug(&pool, &slug).await? else {
        return Ok(Redirect::to("/rango/").into_response());
    };
    let form = form.normalized();
    if let Err(errors) = form.validate() {
        return Ok(AddPagePage {
            current_user,
            category,
            errors: form_errors(&errors),
            form,
        }
        .into_response());
    }

    let id = pages::create_page(&pool, category.id, &form.title, &form.url).await?;
    tracing::info!(id, category = %category.slug, "Page added");
    Ok(Redirect::to(&format!("/rango/category/{}", category.slug)).into_response())
}

/// Counts the visit and sends the browser on to the page itself.
async fn goto(State(pool): State<SqlitePool>, Query(query): Query<PageQuery>) -> ApiResponse<Redirect> {
    let Some(page_id) = query.page_id else {
        return Ok(Redirect::to("/rango/"));
    };
    match pages::record_visit(&pool, page_id).await? {
        Some(visit) => {
            PAGE_VISITS_CNTR
                .with_label_values(&[&visit.category_id.to_string()])
                .inc();
            Ok(Redirect::to(&visit.url))
        }
        None => Ok(Redirect::to("/rango/")),
    }
}

async fn like_category(
    State(pool): State<SqlitePool>,
    RequireUser(user): RequireUser,
    Query(query): Query<CategoryQuery>,
) -> ApiResponse<String> {
    let category_id = query
        .category_id
        .ok_or(ApiError::NotFound("Category does not exist"))?;
    let likes = categories::add_category_like(&pool, category_id)
        .await?
        .ok_or(ApiError::NotFound("Category does not exist"))?;
    CATEGORY_LIKES_CNTR
        .with_label_values(&[&category_id.to_string()])
        .inc();
    tracing::debug!(category_id, user = %user.username, likes, "Category liked");
    Ok(likes.to_string())
}

pub fn category_router(state: AppState) -> Router {
    Router::new()
        .route("/rango/category/{slug}", get(show_category))
        .route(
            "/rango/add_category",
            get(add_category_form).post(add_category),
        )
        .route(
            "/rango/category/{slug}/add_page",
            get(add_page_form).post(add_page),
        )
        .route("/rango/goto", get(goto))
        .route("/rango/like_category", post(like_category))
        .with_state(state)
}
