//! The storefront catalog. Products are fixed at build time.

use axum::{extract::Query, Json};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub price: f64,
    pub category: String,
    pub subcategory: String,
    pub image: String,
}

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    /// Exact category match, e.g. `Men`.
    pub category: Option<String>,
    /// Exact subcategory match, e.g. `Tops`.
    pub subcategory: Option<String>,
}

const CATALOG: [(u32, &str, f64, &str, &str, &str); 6] = [
    (1, "Graphic T-Shirt", 19.99, "Men", "Tops", "T-Shirt"),
    (2, "Slim Fit Jeans", 49.99, "Men", "Bottoms", "Jeans"),
    (3, "Leather Jacket", 89.99, "Men", "Outerwear", "Jacket"),
    (4, "Hoodie", 39.99, "Women", "Tops", "Hoodie"),
    (5, "Skirt", 29.99, "Women", "Bottoms", "Skirt"),
    (6, "Scarf", 15.99, "Women", "Accessories", "Scarf"),
];

#[must_use]
pub fn catalog() -> Vec<Product> {
    CATALOG
        .iter()
        .map(|&(id, name, price, category, subcategory, label)| Product {
            id,
            name: name.to_string(),
            price,
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            image: format!("https://via.placeholder.com/200x200?text={label}"),
        })
        .collect()
}

impl ProductFilter {
    fn matches(&self, product: &Product) -> bool {
        let wanted = |filter: &Option<String>, value: &str| {
            filter
                .as_deref()
                .map(str::trim)
                .filter(|filter| !filter.is_empty())
                .map_or(true, |filter| filter == value)
        };
        wanted(&self.category, &product.category) && wanted(&self.subcategory, &product.subcategory)
    }
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductFilter),
    responses(
        (status = 200, description = "Catalog, optionally filtered", body = [Product])
    ),
    tag = "shop"
)]
pub async fn products(Query(filter): Query<ProductFilter>) -> Json<Vec<Product>> {
    Json(
        catalog()
            .into_iter()
            .filter(|product| filter.matches(product))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(filter: ProductFilter) -> Vec<String> {
        catalog()
            .into_iter()
            .filter(|product| filter.matches(product))
            .map(|product| product.name)
            .collect()
    }

    #[test]
    fn unfiltered_returns_all_six() {
        assert_eq!(names(ProductFilter::default()).len(), 6);
    }

    #[test]
    fn filters_by_category_and_subcategory() {
        let filter = ProductFilter {
            category: Some("Women".to_string()),
            subcategory: Some("Tops".to_string()),
        };
        assert_eq!(names(filter), vec!["Hoodie".to_string()]);
    }

    #[test]
    fn empty_filter_values_are_ignored() {
        let filter = ProductFilter {
            category: Some(String::new()),
            subcategory: Some("Bottoms".to_string()),
        };
        assert_eq!(names(filter).len(), 2);
    }

    #[test]
    fn unknown_category_is_empty() {
        let filter = ProductFilter {
            category: Some("Kids".to_string()),
            subcategory: None,
        };
        assert!(names(filter).is_empty());
    }
}
