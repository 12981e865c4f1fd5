//! Demo content for a fresh database.

use chrono::Utc;
use sqlx::SqlitePool;

use super::queries::{categories, pages, questions};
use super::{Category, PageListing};

struct Seed {
    name: &'static str,
    likes: i64,
    views: i64,
    pages: &'static [(&'static str, &'static str)],
}

const SEEDS: &[Seed] = &[
    Seed {
        name: "Python",
        likes: 64,
        views: 128,
        pages: &[
            ("Official Python Tutorial", "http://docs.python.org/3/tutorial/"),
            ("How to Think like a Computer Scientist", "http://www.greenteapress.com/thinkpython/"),
            ("Learn Python in 10 Minutes", "http://www.korokithakis.net/tutorials/python/"),
        ],
    },
    Seed {
        name: "Django",
        likes: 32,
        views: 64,
        pages: &[
            ("Official Django Tutorial", "https://docs.djangoproject.com/en/2.1/intro/tutorial01/"),
            ("Django Rocks", "http://www.djangorocks.com/"),
            ("How to Tango with Django", "http://www.tangowithdjango.com/"),
        ],
    },
    Seed {
        name: "Other Frameworks",
        likes: 16,
        views: 32,
        pages: &[
            ("Bottle", "http://bottlepy.org/docs/dev/"),
            ("Flask", "http://flask.pocoo.org"),
        ],
    },
];

/// Inserts the demo categories, pages and a sample poll. Running it again
/// resets the demo counters and leaves other data alone.
pub async fn populate(pool: &SqlitePool) -> sqlx::Result<()> {
    let seeded_categories = SEEDS
        .iter()
        .map(|seed| Category {
            id: 0,
            name: seed.name.to_owned(),
            slug: categories::slugify(seed.name),
            likes: seed.likes,
            views: seed.views,
        })
        .collect();
    categories::import_categories(pool, seeded_categories).await?;

    let seeded_pages = SEEDS
        .iter()
        .flat_map(|seed| {
            seed.pages.iter().map(|(title, url)| PageListing {
                category: seed.name.to_owned(),
                title: (*title).to_owned(),
                url: (*url).to_owned(),
                views: 0,
            })
        })
        .collect();
    let added = pages::import_pages(pool, seeded_pages).await?;
    tracing::info!(pages = added, "Populated directory");

    if questions::count_questions(pool).await? == 0 {
        let choices = ["Not much".to_owned(), "The sky".to_owned()];
        questions::create_question(pool, "What's new?", Utc::now(), &choices).await?;
        tracing::info!("Added sample poll");
    }
    Ok(())
}
