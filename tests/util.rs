#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::Value;
use sitecatalog::{
    CatalogSnapshot, CatalogStores, Category, CategoryService, Product, ProductCategory,
};
use tracing::subscriber::{self, DefaultGuard};
use tracing_subscriber::{fmt, EnvFilter};

/// Electronics(1) > {Phones(2) > Smartphones(4), Laptops(3)}; product 10 sits in Smartphones.
pub fn electronics() -> CatalogSnapshot {
    CatalogSnapshot {
        categories: vec![
            Category::new(1, 0, "Electronics"),
            Category::new(2, 1, "Phones"),
            Category::new(3, 1, "Laptops"),
            Category::new(4, 2, "Smartphones"),
        ],
        products: vec![Product::new(10, "Pixel"), Product::new(11, "Loose cable")],
        product_categories: vec![ProductCategory::new(1, 10, 4, 0)],
        ..CatalogSnapshot::default()
    }
}

pub fn electronics_stores() -> CatalogStores {
    electronics().into_stores().expect("seed stores")
}

pub fn electronics_service() -> CategoryService {
    CategoryService::builder(electronics_stores()).build()
}

pub fn ids(categories: &[Category]) -> Vec<i64> {
    categories.iter().map(|c| c.id).collect()
}

pub struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Routes this thread's events into a buffer as JSON lines.
pub fn capture_logs() -> (Arc<Mutex<Vec<u8>>>, DefaultGuard) {
    let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let writer = buffer.clone();
    let subscriber = fmt()
        .with_env_filter(EnvFilter::new("sitecatalog=debug"))
        .with_writer(move || BufferWriter(writer.clone()))
        .json()
        .finish();
    let guard = subscriber::set_default(subscriber);
    (buffer, guard)
}

/// Parsed log lines whose `event` field equals `event`.
pub fn events_named(buffer: &Arc<Mutex<Vec<u8>>>, event: &str) -> Vec<Value> {
    let raw = String::from_utf8(buffer.lock().unwrap().clone()).expect("log utf8");
    raw.lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|entry| entry["fields"]["event"] == event)
        .collect()
}
