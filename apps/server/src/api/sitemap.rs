//! Sitemap generation for the public catalog.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use repodex_shared::Category;

use super::{ApiError, SharedState};

/// `GET /sitemap.xml`: home page plus one URL per category that holds at
/// least one repository. Links are built from the configured public base
/// URL; forwarded headers are never consulted.
pub(super) async fn sitemap(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let categories = state.storage.categories_with_repositories().await?;
    let body = render(&state.public_url, &categories);

    Ok((
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        body,
    )
        .into_response())
}

fn render(base_url: &str, categories: &[Category]) -> String {
    let today = Utc::now().format("%Y-%m-%d");

    let mut lines = vec![
        r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string(),
        r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#.to_string(),
        "  <url>".to_string(),
        format!("    <loc>{base_url}/</loc>"),
        format!("    <lastmod>{today}</lastmod>"),
        "    <changefreq>daily</changefreq>".to_string(),
        "    <priority>1.0</priority>".to_string(),
        "  </url>".to_string(),
    ];

    for category in categories {
        lines.push("  <url>".to_string());
        lines.push(format!(
            "    <loc>{base_url}/?category_id={}</loc>",
            category.id
        ));
        lines.push(format!("    <lastmod>{today}</lastmod>"));
        lines.push("    <changefreq>weekly</changefreq>".to_string());
        lines.push("    <priority>0.8</priority>".to_string());
        lines.push("  </url>".to_string());
    }

    lines.push("</urlset>".to_string());
    lines.join("\n")
}
