use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::error::ApiError;
use crate::services::storage::Upload;

/// A value bound into an INSERT or UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    OptText(Option<String>),
    Bool(bool),
    Date(NaiveDate),
    Int(i32),
    Json(serde_json::Value),
}

pub type Fields = Vec<(&'static str, FieldValue)>;

/// Where an upload arrives and where its stored name lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSlot {
    /// Multipart field carrying the file.
    pub field: &'static str,
    pub column: &'static str,
    /// Creating a row without this file is a bad request.
    pub required: bool,
}

const fn slot(field: &'static str, column: &'static str, required: bool) -> FileSlot {
    FileSlot { field, column, required }
}

/// A per-tenant site table exposed through the generic CRUD routes.
pub trait SiteEntity:
    for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow> + Serialize + Send + Unpin + 'static
{
    const TABLE: &'static str;
    /// Human name used in error messages.
    const LABEL: &'static str;
    const COLUMNS: &'static str;
    const FILES: &'static [FileSlot] = &[];
    /// Rows have a `status` flag; public callers only see active ones.
    const PUBLISHABLE: bool = false;

    /// Stored file name held in `column`, if any.
    fn stored_file(&self, _column: &str) -> Option<&str> {
        None
    }

    fn stored_files(&self) -> Vec<String> {
        Self::FILES
            .iter()
            .filter_map(|slot| self.stored_file(slot.column))
            .map(str::to_string)
            .collect()
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError>;
    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError>;
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Header {
    pub id: i32,
    pub name: String,
    pub logo: Option<String>,
}

impl SiteEntity for Header {
    const TABLE: &'static str = "header";
    const LABEL: &'static str = "Header";
    const COLUMNS: &'static str = "id, name, logo";
    const FILES: &'static [FileSlot] = &[slot("photo", "logo", true)];

    fn stored_file(&self, column: &str) -> Option<&str> {
        match column {
            "logo" => self.logo.as_deref(),
            _ => None,
        }
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        Ok(vec![("name", FieldValue::Text(form.required("name", 100)?))])
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let mut fields = Fields::new();
        if let Some(name) = form.optional("name", 100)? {
            fields.push(("name", FieldValue::Text(name)));
        }
        Ok(fields)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Contact {
    pub id: i32,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
}

impl SiteEntity for Contact {
    const TABLE: &'static str = "contact";
    const LABEL: &'static str = "Contact";
    const COLUMNS: &'static str = "id, email, phone, address";

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        Ok(vec![
            ("email", FieldValue::Text(form.required("email", 100)?)),
            ("phone", FieldValue::Text(form.required("phone", 100)?)),
            ("address", FieldValue::OptText(Some(form.required("address", 255)?))),
        ])
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let mut fields = Fields::new();
        if let Some(email) = form.optional("email", 100)? {
            fields.push(("email", FieldValue::Text(email)));
        }
        if let Some(phone) = form.optional("phone", 100)? {
            fields.push(("phone", FieldValue::Text(phone)));
        }
        if let Some(address) = form.optional("address", 255)? {
            fields.push(("address", FieldValue::OptText(Some(address))));
        }
        Ok(fields)
    }
}

/// Company blocks and carousel slides share a shape.
fn titled_create(form: &ContentForm) -> Result<Fields, ApiError> {
    let mut fields = vec![
        ("title", FieldValue::Text(form.required("title", 100)?)),
        ("description", FieldValue::Text(form.required("description", usize::MAX)?)),
    ];
    if let Some(status) = form.flag("status")? {
        fields.push(("status", FieldValue::Bool(status)));
    }
    Ok(fields)
}

fn titled_update(form: &ContentForm) -> Result<Fields, ApiError> {
    let mut fields = Fields::new();
    if let Some(title) = form.optional("title", 100)? {
        fields.push(("title", FieldValue::Text(title)));
    }
    if let Some(description) = form.optional("description", usize::MAX)? {
        fields.push(("description", FieldValue::Text(description)));
    }
    if let Some(status) = form.flag("status")? {
        fields.push(("status", FieldValue::Bool(status)));
    }
    Ok(fields)
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Company {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub photo: Option<String>,
    pub status: bool,
}

impl SiteEntity for Company {
    const TABLE: &'static str = "company";
    const LABEL: &'static str = "Company";
    const COLUMNS: &'static str = "id, title, description, photo, status";
    const FILES: &'static [FileSlot] = &[slot("photo", "photo", true)];
    const PUBLISHABLE: bool = true;

    fn stored_file(&self, column: &str) -> Option<&str> {
        self.photo.as_deref().filter(|_| column == "photo")
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        titled_create(form)
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        titled_update(form)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Carousel {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub photo: Option<String>,
    pub status: bool,
}

impl SiteEntity for Carousel {
    const TABLE: &'static str = "carrousel";
    const LABEL: &'static str = "Carrousel";
    const COLUMNS: &'static str = "id, title, description, photo, status";
    const FILES: &'static [FileSlot] = &[slot("photo", "photo", true)];
    const PUBLISHABLE: bool = true;

    fn stored_file(&self, column: &str) -> Option<&str> {
        self.photo.as_deref().filter(|_| column == "photo")
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        titled_create(form)
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        titled_update(form)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct News {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub fecha: NaiveDate,
    pub photo: String,
    pub status: bool,
}

impl SiteEntity for News {
    const TABLE: &'static str = "news";
    const LABEL: &'static str = "News";
    const COLUMNS: &'static str = "id, title, description, fecha, photo, status";
    const FILES: &'static [FileSlot] = &[slot("photo", "photo", true)];
    const PUBLISHABLE: bool = true;

    fn stored_file(&self, column: &str) -> Option<&str> {
        (column == "photo").then_some(self.photo.as_str())
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let mut fields = titled_create(form)?;
        let fecha = form
            .date("fecha")?
            .ok_or_else(|| ApiError::bad_request("Field 'fecha' is required"))?;
        fields.push(("fecha", FieldValue::Date(fecha)));
        Ok(fields)
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let mut fields = titled_update(form)?;
        if let Some(fecha) = form.date("fecha")? {
            fields.push(("fecha", FieldValue::Date(fecha)));
        }
        Ok(fields)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub photo: String,
}

impl SiteEntity for Review {
    const TABLE: &'static str = "reviews";
    const LABEL: &'static str = "Reviews";
    const COLUMNS: &'static str = "id, title, description, photo";
    const FILES: &'static [FileSlot] = &[slot("photo", "photo", true)];

    fn stored_file(&self, column: &str) -> Option<&str> {
        (column == "photo").then_some(self.photo.as_str())
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        Ok(vec![
            ("title", FieldValue::Text(form.required("title", 100)?)),
            ("description", FieldValue::Text(form.required("description", usize::MAX)?)),
        ])
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let mut fields = Fields::new();
        if let Some(title) = form.optional("title", 100)? {
            fields.push(("title", FieldValue::Text(title)));
        }
        if let Some(description) = form.optional("description", usize::MAX)? {
            fields.push(("description", FieldValue::Text(description)));
        }
        Ok(fields)
    }
}

/// Categories only carry a title.
fn title_create(form: &ContentForm) -> Result<Fields, ApiError> {
    Ok(vec![("title", FieldValue::Text(form.required("title", 100)?))])
}

fn title_update(form: &ContentForm) -> Result<Fields, ApiError> {
    let mut fields = Fields::new();
    if let Some(title) = form.optional("title", 100)? {
        fields.push(("title", FieldValue::Text(title)));
    }
    Ok(fields)
}

macro_rules! category_entity {
    ($name:ident, $table:literal, $label:literal) => {
        #[derive(Debug, Clone, Serialize, FromRow)]
        pub struct $name {
            pub id: i32,
            pub title: String,
        }

        impl SiteEntity for $name {
            const TABLE: &'static str = $table;
            const LABEL: &'static str = $label;
            const COLUMNS: &'static str = "id, title";

            fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
                title_create(form)
            }

            fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
                title_update(form)
            }
        }
    };
}

category_entity!(Category, "category", "Category");
category_entity!(ManagerCategory, "manager_category", "Manager category");
category_entity!(PublicationCategory, "publication_category", "Publication category");

/// One priced option of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub photo: String,
    pub category_id: i32,
    pub variants: Json<Vec<ProductVariant>>,
}

impl SiteEntity for Product {
    const TABLE: &'static str = "product";
    const LABEL: &'static str = "Product";
    const COLUMNS: &'static str = "id, title, description, photo, category_id, variants";
    const FILES: &'static [FileSlot] = &[slot("photo", "photo", true)];

    fn stored_file(&self, column: &str) -> Option<&str> {
        (column == "photo").then_some(self.photo.as_str())
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let category = form
            .int("category_id")?
            .ok_or_else(|| ApiError::bad_request("Field 'category_id' is required"))?;
        let mut fields = vec![
            ("title", FieldValue::Text(form.required("title", 100)?)),
            ("description", FieldValue::Text(form.required("description", usize::MAX)?)),
            ("category_id", FieldValue::Int(category)),
        ];
        if let Some(variants) = form.variants("variants")? {
            fields.push(("variants", variants));
        }
        Ok(fields)
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let mut fields = Fields::new();
        if let Some(title) = form.optional("title", 100)? {
            fields.push(("title", FieldValue::Text(title)));
        }
        if let Some(description) = form.optional("description", usize::MAX)? {
            fields.push(("description", FieldValue::Text(description)));
        }
        if let Some(category) = form.int("category_id")? {
            fields.push(("category_id", FieldValue::Int(category)));
        }
        if let Some(variants) = form.variants("variants")? {
            fields.push(("variants", variants));
        }
        Ok(fields)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Manager {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub charge: String,
    pub photo: Option<String>,
}

impl SiteEntity for Manager {
    const TABLE: &'static str = "manager";
    const LABEL: &'static str = "Manager";
    const COLUMNS: &'static str = "id, title, description, charge, photo";
    const FILES: &'static [FileSlot] = &[slot("photo", "photo", false)];

    fn stored_file(&self, column: &str) -> Option<&str> {
        self.photo.as_deref().filter(|_| column == "photo")
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        Ok(vec![
            ("title", FieldValue::Text(form.required("title", 100)?)),
            ("description", FieldValue::Text(form.required("description", usize::MAX)?)),
            ("charge", FieldValue::Text(form.required("charge", 100)?)),
        ])
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let mut fields = Fields::new();
        if let Some(title) = form.optional("title", 100)? {
            fields.push(("title", FieldValue::Text(title)));
        }
        if let Some(description) = form.optional("description", usize::MAX)? {
            fields.push(("description", FieldValue::Text(description)));
        }
        if let Some(charge) = form.optional("charge", 100)? {
            fields.push(("charge", FieldValue::Text(charge)));
        }
        Ok(fields)
    }
}

/// A downloadable document with an optional cover image.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Publication {
    pub id: i32,
    pub title: String,
    pub photo: Option<String>,
    pub file: String,
    pub publication_category_id: i32,
}

impl SiteEntity for Publication {
    const TABLE: &'static str = "publication";
    const LABEL: &'static str = "Publication";
    const COLUMNS: &'static str = "id, title, photo, file, publication_category_id";
    const FILES: &'static [FileSlot] = &[slot("file", "file", true), slot("photo", "photo", false)];

    fn stored_file(&self, column: &str) -> Option<&str> {
        match column {
            "file" => Some(&self.file),
            "photo" => self.photo.as_deref(),
            _ => None,
        }
    }

    fn create_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let category = form
            .int("publication_category_id")?
            .ok_or_else(|| ApiError::bad_request("Field 'publication_category_id' is required"))?;
        Ok(vec![
            ("title", FieldValue::Text(form.required("title", 100)?)),
            ("publication_category_id", FieldValue::Int(category)),
        ])
    }

    fn update_fields(form: &ContentForm) -> Result<Fields, ApiError> {
        let mut fields = title_update(form)?;
        if let Some(category) = form.int("publication_category_id")? {
            fields.push(("publication_category_id", FieldValue::Int(category)));
        }
        Ok(fields)
    }
}

/// Text fields plus uploaded files keyed by field name, read from a multipart
/// body.
#[derive(Debug, Default)]
pub struct ContentForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl ContentForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = ContentForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or("").to_string();
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                // Browsers send an empty part for an untouched file input.
                if !bytes.is_empty() {
                    form.files.insert(
                        name,
                        Upload {
                            file_name: Some(file_name),
                            content_type,
                            bytes,
                        },
                    );
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// Build a form directly, mainly for tests and internal callers.
    pub fn with_fields<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: HashMap::new(),
        }
    }

    pub fn with_file(mut self, field: &str, file_name: &str, content_type: &str, bytes: Bytes) -> Self {
        self.files.insert(
            field.to_string(),
            Upload {
                file_name: Some(file_name.to_string()),
                content_type: content_type.to_string(),
                bytes,
            },
        );
        self
    }

    pub fn take_file(&mut self, field: &str) -> Option<Upload> {
        self.files.remove(field)
    }

    pub fn has_file(&self, field: &str) -> bool {
        self.files.contains_key(field)
    }

    pub fn optional(&self, name: &str, max_len: usize) -> Result<Option<String>, ApiError> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(v) if v.chars().count() > max_len => Err(ApiError::bad_request(format!(
                "Field '{name}' exceeds {max_len} characters"
            ))),
            Some(v) => Ok(Some(v.clone())),
        }
    }

    pub fn required(&self, name: &str, max_len: usize) -> Result<String, ApiError> {
        self.optional(name, max_len)?
            .ok_or_else(|| ApiError::bad_request(format!("Field '{name}' is required")))
    }

    pub fn flag(&self, name: &str) -> Result<Option<bool>, ApiError> {
        match self.fields.get(name).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(None),
            Some(v) => match v.as_str() {
                "true" | "1" | "on" | "yes" => Ok(Some(true)),
                "false" | "0" | "off" | "no" => Ok(Some(false)),
                _ => Err(ApiError::bad_request(format!("Field '{name}' must be a boolean"))),
            },
        }
    }

    pub fn int(&self, name: &str) -> Result<Option<i32>, ApiError> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ApiError::bad_request(format!("Field '{name}' must be an integer"))),
        }
    }

    /// A JSON list of `{description, price}` objects.
    pub fn variants(&self, name: &str) -> Result<Option<FieldValue>, ApiError> {
        let Some(raw) = self.fields.get(name) else {
            return Ok(None);
        };
        let variants: Vec<ProductVariant> = serde_json::from_str(raw).map_err(|_| {
            ApiError::bad_request(format!(
                "Field '{name}' must be a JSON list of {{description, price}} objects"
            ))
        })?;
        let value = serde_json::to_value(variants).map_err(|e| ApiError::Internal(e.into()))?;
        Ok(Some(FieldValue::Json(value)))
    }

    pub fn date(&self, name: &str) -> Result<Option<NaiveDate>, ApiError> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(v) => NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(|_| ApiError::bad_request(format!("Field '{name}' must be YYYY-MM-DD"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titled_forms_validate_lengths_and_flags() {
        let long = "x".repeat(101);
        let form = ContentForm::with_fields([("title", long.as_str()), ("description", "d")]);
        assert!(Company::create_fields(&form).is_err());

        let form = ContentForm::with_fields([("title", "t"), ("description", "d"), ("status", "false")]);
        let fields = Carousel::create_fields(&form).unwrap();
        assert!(fields.contains(&("status", FieldValue::Bool(false))));

        let form = ContentForm::with_fields([("status", "maybe")]);
        assert!(Company::update_fields(&form).is_err());
    }

    #[test]
    fn news_requires_iso_date() {
        let form = ContentForm::with_fields([("title", "t"), ("description", "d"), ("fecha", "2024-02-30")]);
        assert!(News::create_fields(&form).is_err());

        let form = ContentForm::with_fields([("title", "t"), ("description", "d"), ("fecha", "2024-02-29")]);
        let fields = News::create_fields(&form).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert!(fields.contains(&("fecha", FieldValue::Date(expected))));
    }

    #[test]
    fn product_variants_must_be_priced_objects() {
        let base = [("title", "Mesa"), ("description", "Roble"), ("category_id", "2")];

        let form = ContentForm::with_fields(base.into_iter().chain([("variants", r#"[{"description":"Grande"}]"#)]));
        assert!(Product::create_fields(&form).is_err());

        let form = ContentForm::with_fields(base.into_iter().chain([("variants", r#"{"description":"x","price":1}"#)]));
        assert!(Product::create_fields(&form).is_err());

        let form = ContentForm::with_fields(
            base.into_iter()
                .chain([("variants", r#"[{"description":"Grande","price":120.5}]"#)]),
        );
        let fields = Product::create_fields(&form).unwrap();
        assert!(fields.contains(&("category_id", FieldValue::Int(2))));
        let expected = serde_json::json!([{"description": "Grande", "price": 120.5}]);
        assert!(fields.contains(&("variants", FieldValue::Json(expected))));

        let form = ContentForm::with_fields([("title", "t"), ("description", "d"), ("category_id", "dos")]);
        assert!(Product::create_fields(&form).is_err());
    }

    #[test]
    fn publications_take_a_document_and_an_optional_cover() {
        let required: Vec<&str> = Publication::FILES
            .iter()
            .filter(|slot| slot.required)
            .map(|slot| slot.field)
            .collect();
        assert_eq!(required, vec!["file"]);

        let row = Publication {
            id: 1,
            title: "Informe".into(),
            photo: Some("cover.png".into()),
            file: "doc.png".into(),
            publication_category_id: 1,
        };
        assert_eq!(row.stored_files(), vec!["doc.png".to_string(), "cover.png".to_string()]);

        let form = ContentForm::default().with_file("photo", "a.png", "image/png", Bytes::from_static(b"x"));
        assert!(form.has_file("photo"));
        assert!(!form.has_file("file"));
    }

    #[test]
    fn partial_updates_only_touch_sent_fields() {
        let form = ContentForm::with_fields([("phone", "+1 555")]);
        let fields = Contact::update_fields(&form).unwrap();
        assert_eq!(fields, vec![("phone", FieldValue::Text("+1 555".into()))]);
    }
}
