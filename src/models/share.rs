use serde::{Deserialize, Serialize};

/// Public preview card for an invoice. Values are stored preformatted for display.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceShare {
    pub id: String,
    pub user_id: Option<i64>,
    pub client_name: String,
    pub value: String,
    pub due_date: String,
    pub logo: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateShare {
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub due_date: String,
    pub logo: Option<String>,
}

/// Query string of the legacy `/share-invoice` page.
#[derive(Debug, Default, Deserialize)]
pub struct ShareQuery {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub due_date: String,
    pub logo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShareCreated {
    pub id: String,
    pub url: String,
}
