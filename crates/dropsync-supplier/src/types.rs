//! Typed wire shapes for the supplier REST API.
//!
//! The supplier answers everything in a `{code, result, message, data}`
//! envelope. Shapes are parsed once at this boundary; nothing downstream
//! ever re-parses loose JSON.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level response envelope. `code == 200` with `result == true` means
/// success; anything else is a business error carrying `message`.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Payload of the `getAccessToken` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenData {
    pub access_token: String,
    /// RFC 3339 expiry; the client refreshes slightly before this.
    pub access_token_expiry_date: chrono::DateTime<chrono::Utc>,
}

/// One page of the supplier catalog listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub page_num: u32,
    pub page_size: u32,
    pub total: u64,
    #[serde(default)]
    pub list: Vec<ProductSummary>,
}

/// Catalog listing entry; detail fetches fill in variants and images.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub pid: String,
    pub product_name: String,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub sell_price: Decimal,
    #[serde(default)]
    pub product_image: Option<String>,
}

/// Full supplier product snapshot from the detail endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierProduct {
    pub pid: String,
    pub product_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub sell_price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub product_images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<SupplierVariant>,
}

/// A variant as reported on the product detail payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierVariant {
    pub vid: String,
    #[serde(default)]
    pub variant_sku: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub variant_sell_price: Decimal,
    #[serde(default)]
    pub variant_stock: i32,
}

/// Per-warehouse-region stock level for one variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStock {
    pub country_code: String,
    pub stock: i32,
}

/// Request body for supplier order creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSupplierOrder {
    /// Local order reference echoed back by the supplier.
    pub order_number: String,
    pub consignee: String,
    pub address: String,
    pub city: String,
    pub zip: String,
    pub country_code: String,
    pub products: Vec<OrderLine>,
}

/// One order line. `vid` is preferred; `pid` is the degraded product-level
/// fallback when no variant carries an external id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    pub quantity: i32,
}

/// Payload of a successful order creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: String,
}

/// Supplier-side order status as reported by the detail endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierOrderDetail {
    pub order_id: String,
    /// Raw supplier status string (`CREATED`, `SHIPPED`, `DELIVERED`, ...).
    pub order_status: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_business_error() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"code": 1602, "result": false, "message": "product not found", "data": null}"#,
        )
        .expect("parse envelope");
        assert_eq!(envelope.code, 1602);
        assert!(!envelope.result);
        assert_eq!(envelope.message.as_deref(), Some("product not found"));
    }

    #[test]
    fn product_detail_parses_variants_and_prices() {
        let product: SupplierProduct = serde_json::from_value(serde_json::json!({
            "pid": "P123",
            "productName": "Leather Wallet",
            "categoryName": "Men > Leather Wallets",
            "sellPrice": "12.50",
            "productImages": ["https://img.example.com/1.jpg"],
            "variants": [
                {"vid": "V1", "variantSku": "WAL-BRN", "variantSellPrice": "12.50", "variantStock": 40}
            ]
        }))
        .expect("parse product");
        assert_eq!(product.variants.len(), 1);
        assert_eq!(product.variants[0].vid, "V1");
        assert_eq!(product.sell_price, Decimal::new(1250, 2));
    }

    #[test]
    fn order_line_omits_unset_identifiers() {
        let line = OrderLine {
            vid: None,
            pid: Some("P123".to_owned()),
            quantity: 2,
        };
        let json = serde_json::to_value(&line).expect("serialize");
        assert!(json.get("vid").is_none(), "unset vid must be omitted");
        assert_eq!(json["pid"], "P123");
    }
}
