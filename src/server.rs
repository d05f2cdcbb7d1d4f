use actix_web::{HttpRequest, HttpResponse, Responder, get, web};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::catalog::Catalog;
use crate::price::{PriceReader, QuoteSource};
use crate::query::{ProductQuery, products};

// -------------------------
// Shared state
// -------------------------

pub struct AppState {
    pub catalog: Catalog,
    pub prices: PriceReader,
    /// Served if a request somehow beats the first refresh cycle.
    pub fallback: f64,
}

impl AppState {
    pub fn per_gram(&self) -> f64 {
        self.prices
            .current()
            .map(|q| q.per_gram)
            .unwrap_or(self.fallback)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PriceView {
    price_per_gram: f64,
    source: QuoteSource,
    updated_at: Option<String>,
}

// -------------------------
// HTTP Handlers
// -------------------------

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok().body(
        "Aurum online.\n\
         JSON:\n  GET  /api/products?minPrice=&maxPrice=&minRating=&maxRating=&sortBy=price|rating|ratio\n  GET  /api/price\n\
         Health:\n  GET  /healthz",
    )
}

#[get("/healthz")]
async fn healthz() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

#[get("/api/products")]
async fn list_products(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    let query = ProductQuery::parse(req.query_string());
    let entries = products(state.catalog.entries(), state.per_gram(), &query);
    HttpResponse::Ok().json(entries)
}

#[get("/api/price")]
async fn current_price(state: web::Data<AppState>) -> impl Responder {
    let view = match state.prices.current() {
        Some(q) => PriceView {
            price_per_gram: q.per_gram,
            source: q.source,
            updated_at: q.updated_at.format(&Rfc3339).ok(),
        },
        None => PriceView {
            price_per_gram: state.fallback,
            source: QuoteSource::Fallback,
            updated_at: None,
        },
    };
    HttpResponse::Ok().json(view)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(healthz)
        .service(list_products)
        .service(current_price);
}
