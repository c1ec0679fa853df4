//! Order line items: the typed row every downstream stage reads.

use crate::types::{CustomerId, OrderId, Year};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column names of the order file, after header whitespace is trimmed.
pub mod column {
    pub const ORDER_ID:             &str = "Order ID";
    pub const CUSTOMER_ID:          &str = "Customer ID";
    pub const ORDER_DATE:           &str = "Order Date";
    pub const SHIP_DATE:            &str = "Ship Date";
    pub const PRODUCT_NAME:         &str = "Product Name";
    pub const PRODUCT_CATEGORY:     &str = "Product Category";
    pub const PRODUCT_SUB_CATEGORY: &str = "Product Sub-Category";
    pub const ORDER_PRIORITY:       &str = "Order Priority";
    pub const CUSTOMER_SEGMENT:     &str = "Customer Segment";
    pub const SHIP_MODE:            &str = "Ship Mode";
    pub const UNIT_PRICE:           &str = "Unit Price";
    pub const SHIPPING_COST:        &str = "Shipping Cost";
    pub const QUANTITY:             &str = "Quantity";

    pub const SALES_WITHOUT_SHIPPING: &str = "SalesAmountWithoutShipping";
    pub const SALES_WITH_SHIPPING:    &str = "SalesAmountWithShipping";

    /// Every column the cleaner requires, in output order.
    pub const REQUIRED: [&str; 13] = [
        ORDER_ID,
        CUSTOMER_ID,
        ORDER_DATE,
        SHIP_DATE,
        PRODUCT_NAME,
        PRODUCT_CATEGORY,
        PRODUCT_SUB_CATEGORY,
        ORDER_PRIORITY,
        CUSTOMER_SEGMENT,
        SHIP_MODE,
        UNIT_PRICE,
        SHIPPING_COST,
        QUANTITY,
    ];

    /// Columns the cleaner computes itself and never reads.
    pub const DERIVED: [&str; 2] = [SALES_WITHOUT_SHIPPING, SALES_WITH_SHIPPING];
}

// ── Categorical fields ───────────────────────────────────────────────────────

/// Fold a label for comparison: lowercase, no spaces, dashes or underscores.
fn fold_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! categorical {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            /// Match a raw cell against the known labels, ignoring case
            /// and separators. Unknown or empty cells yield `None`.
            pub fn parse(raw: &str) -> Option<Self> {
                let folded = fold_label(raw);
                if folded.is_empty() {
                    return None;
                }
                Self::ALL.iter().copied().find(|v| fold_label(v.label()) == folded)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

categorical!(
    OrderPriority {
        Critical     => "Critical",
        High         => "High",
        Medium       => "Medium",
        Low          => "Low",
        NotSpecified => "Not Specified",
    }
);

categorical!(
    CustomerSegment {
        Consumer      => "Consumer",
        Corporate     => "Corporate",
        HomeOffice    => "Home Office",
        SmallBusiness => "Small Business",
    }
);

categorical!(
    ShipMode {
        RegularAir    => "Regular Air",
        ExpressAir    => "Express Air",
        DeliveryTruck => "Delivery Truck",
        StandardClass => "Standard Class",
        SecondClass   => "Second Class",
        FirstClass    => "First Class",
        SameDay       => "Same Day",
    }
);

categorical!(
    ProductCategory {
        Furniture      => "Furniture",
        OfficeSupplies => "Office Supplies",
        Technology     => "Technology",
    }
);

/// Product sub-categories are an open set; only the empty cell is missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubCategory(String);

impl SubCategory {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| SubCategory(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Order record ─────────────────────────────────────────────────────────────

/// One cleaned order line item. Immutable once the cleaner has built it.
///
/// Numeric fields that could not be coerced are `None` and stay `None`
/// through every derived amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id:               OrderId,
    pub customer_id:            CustomerId,
    pub order_date:             NaiveDate,
    pub ship_date:              Option<NaiveDate>,
    pub product_name:           String,
    pub product_category:       Option<ProductCategory>,
    pub product_sub_category:   Option<SubCategory>,
    pub order_priority:         Option<OrderPriority>,
    pub customer_segment:       Option<CustomerSegment>,
    pub ship_mode:              Option<ShipMode>,
    pub unit_price:             Option<f64>,
    pub shipping_cost:          Option<f64>,
    pub quantity:               Option<i64>,
    pub sales_without_shipping: Option<f64>,
    pub sales_with_shipping:    Option<f64>,
}

impl OrderRecord {
    /// UnitPrice × Quantity.
    pub fn line_amount(unit_price: Option<f64>, quantity: Option<i64>) -> Option<f64> {
        Some(unit_price? * quantity? as f64)
    }

    /// Fill both derived sales amounts from the base fields.
    pub fn with_derived_amounts(mut self) -> Self {
        self.sales_without_shipping = Self::line_amount(self.unit_price, self.quantity);
        self.sales_with_shipping = self
            .sales_without_shipping
            .zip(self.shipping_cost)
            .map(|(sales, shipping)| sales + shipping);
        self
    }

    pub fn order_year(&self) -> Year {
        self.order_date.year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorical_parse_ignores_case_and_separators() {
        assert_eq!(CustomerSegment::parse("home office"), Some(CustomerSegment::HomeOffice));
        assert_eq!(CustomerSegment::parse(" Small-Business "), Some(CustomerSegment::SmallBusiness));
        assert_eq!(OrderPriority::parse("NOT SPECIFIED"), Some(OrderPriority::NotSpecified));
        assert_eq!(ShipMode::parse("Hovercraft"), None);
        assert_eq!(ProductCategory::parse(""), None);
    }

    #[test]
    fn missing_inputs_propagate_to_derived_amounts() {
        let base = OrderRecord {
            order_id:               "1".into(),
            customer_id:            "C1".into(),
            order_date:             NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            ship_date:              None,
            product_name:           "Widget".into(),
            product_category:       None,
            product_sub_category:   None,
            order_priority:         None,
            customer_segment:       None,
            ship_mode:              None,
            unit_price:             Some(2.5),
            shipping_cost:          Some(1.0),
            quantity:               Some(4),
            sales_without_shipping: None,
            sales_with_shipping:    None,
        };

        let full = base.clone().with_derived_amounts();
        assert_eq!(full.sales_without_shipping, Some(10.0));
        assert_eq!(full.sales_with_shipping, Some(11.0));

        let no_shipping = OrderRecord { shipping_cost: None, ..base.clone() }.with_derived_amounts();
        assert_eq!(no_shipping.sales_without_shipping, Some(10.0));
        assert_eq!(no_shipping.sales_with_shipping, None);

        let no_qty = OrderRecord { quantity: None, ..base }.with_derived_amounts();
        assert_eq!(no_qty.sales_without_shipping, None);
        assert_eq!(no_qty.sales_with_shipping, None);
    }
}
