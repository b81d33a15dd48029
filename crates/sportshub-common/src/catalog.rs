use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub brand: String,
    pub category: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Inventory for one size of one product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stock {
    pub id: i64,
    pub product_id: i64,
    pub size: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Review {
    pub const MIN_RATING: i64 = 1;
    pub const MAX_RATING: i64 = 5;

    pub fn rating_in_range(rating: i64) -> bool {
        (Self::MIN_RATING..=Self::MAX_RATING).contains(&rating)
    }
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub stock: Vec<Stock>,
    pub review_count: i64,
    pub average_rating: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product {
            id: 1,
            name: "Trail Runner".to_string(),
            description: String::new(),
            brand: "Stride".to_string(),
            category: "shoes".to_string(),
            price_cents: 8999,
            image_url: None,
            created_at: "2024-01-01".to_string(),
            updated_at: "2024-01-01".to_string(),
        }
    }

    #[test]
    fn rating_bounds() {
        assert!(!Review::rating_in_range(0));
        assert!(Review::rating_in_range(1));
        assert!(Review::rating_in_range(5));
        assert!(!Review::rating_in_range(6));
    }

    #[test]
    fn product_detail_flattens_product_fields() {
        let detail = ProductDetail {
            product: product(),
            stock: vec![
                Stock { id: 1, product_id: 1, size: "42".into(), quantity: 3 },
                Stock { id: 2, product_id: 1, size: "43".into(), quantity: 4 },
            ],
            review_count: 0,
            average_rating: None,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["name"], "Trail Runner");
        assert_eq!(json["price_cents"], 8999);
        assert_eq!(json["stock"].as_array().unwrap().len(), 2);
        assert!(json["average_rating"].is_null());
    }
}
