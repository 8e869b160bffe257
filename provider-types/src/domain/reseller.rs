//! Reseller operation inputs and their upstream payload shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignBundle {
    pub bundle_code: String,
    pub order_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AssignBundle {
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("bundle_code".into(), json!(self.bundle_code));
        payload.insert("order_reference".into(), json!(self.order_reference));
        if let Some(name) = self.name.as_deref().filter(|s| !s.is_empty()) {
            payload.insert("name".into(), json!(name));
        }
        if let Some(email) = self.email.as_deref().filter(|s| !s.is_empty()) {
            payload.insert("email".into(), json!(email));
        }
        Value::Object(payload)
    }
}

/// Filters for `/orders/list`. Empty filters are not sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OrderListQuery {
    pub page_number: u32,
    pub page_size: u32,
    #[serde(default)]
    pub bundle_code: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_reference: Option<String>,
    /// `YYYY/MM/DD HH:MM:SS`
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub iccid: Option<String>,
}

impl OrderListQuery {
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("page_number".into(), json!(self.page_number));
        payload.insert("page_size".into(), json!(self.page_size));
        let filters = [
            ("bundle_code", &self.bundle_code),
            ("order_id", &self.order_id),
            ("order_reference", &self.order_reference),
            ("start_date", &self.start_date),
            ("end_date", &self.end_date),
            ("iccid", &self.iccid),
        ];
        for (key, value) in filters {
            if let Some(v) = value.as_deref().filter(|s| !s.is_empty()) {
                payload.insert(key.into(), json!(v));
            }
        }
        Value::Object(payload)
    }
}

/// Filters for `/bundle/list`. The upstream requires every field as a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BundleListQuery {
    pub page_number: u32,
    pub page_size: u32,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region_code: Option<String>,
    #[serde(default)]
    pub bundle_category: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub bundle_code: Option<String>,
}

impl BundleListQuery {
    pub fn to_payload(&self) -> Value {
        json!({
            "page_number": self.page_number,
            "page_size": self.page_size,
            "country_code": self.country_code.as_deref().unwrap_or_default().to_uppercase(),
            "region_code": self.region_code.as_deref().unwrap_or_default().to_lowercase(),
            "bundle_category": self.bundle_category.as_deref().unwrap_or_default().to_lowercase(),
            "sort_by": self.sort_by.as_deref().unwrap_or_default(),
            "bundle_code": self.bundle_code.as_deref().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AgentBillsQuery {
    pub page_number: u32,
    pub page_size: u32,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl AgentBillsQuery {
    pub fn to_payload(&self) -> Value {
        json!({
            "page_number": self.page_number,
            "page_size": self.page_size,
            "reference": self.reference.as_deref().unwrap_or_default(),
            "start_date": self.start_date.as_deref().unwrap_or_default(),
            "end_date": self.end_date.as_deref().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_list_skips_empty_filters() {
        let query = OrderListQuery {
            page_number: 1,
            page_size: 20,
            iccid: Some("8910".into()),
            order_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            query.to_payload(),
            json!({"page_number": 1, "page_size": 20, "iccid": "8910"})
        );
    }

    #[test]
    fn test_bundle_list_normalises_case() {
        let query = BundleListQuery {
            page_number: 2,
            page_size: 10,
            country_code: Some("gb".into()),
            region_code: Some("EU".into()),
            ..Default::default()
        };
        let payload = query.to_payload();
        assert_eq!(payload["country_code"], "GB");
        assert_eq!(payload["region_code"], "eu");
        assert_eq!(payload["bundle_category"], "");
        assert_eq!(payload["sort_by"], "");
    }

    #[test]
    fn test_assign_bundle_optional_fields() {
        let assign = AssignBundle {
            bundle_code: "B1".into(),
            order_reference: "R1".into(),
            name: None,
            email: Some("a@b.c".into()),
        };
        assert_eq!(
            assign.to_payload(),
            json!({"bundle_code": "B1", "order_reference": "R1", "email": "a@b.c"})
        );
    }
}
