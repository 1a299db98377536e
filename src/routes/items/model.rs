use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use url::Url;
use uuid::Uuid;

pub const MAX_IMAGES: usize = 5;
pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Item columns plus the seller's profile, aliased so one row type serves every query.
const ITEM_COLUMNS: &str = "i.id, i.title, i.description, i.price, i.price_type, i.category, \
     i.listing_type, i.condition, i.images, i.user_id, i.created_at, i.updated_at, \
     u.id AS seller_id, u.full_name AS seller_full_name, u.department AS seller_department, \
     u.whatsapp_number AS seller_whatsapp";

const JOIN_SELLER: &str = "LEFT JOIN users u ON u.id = i.user_id";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed set of text-valued enums stored as plain `text` columns.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(ItemCategory, "category", {
    LabEquipment => "Lab Equipment",
    BooksNotes => "Books/Notes",
    Furniture => "Furniture",
    Electronics => "Electronics",
    Tickets => "Tickets",
    Miscellaneous => "Miscellaneous",
});

text_enum!(ListingType, "listing type", {
    Sell => "sell",
    Buy => "buy",
    Rent => "rent",
});

text_enum!(PriceType, "price type", {
    Fixed => "fixed",
    Negotiable => "negotiable",
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub price_type: PriceType,
    pub category: ItemCategory,
    pub listing_type: ListingType,
    pub condition: Option<String>,
    pub images: Vec<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Seller {
    pub id: Uuid,
    pub full_name: String,
    pub department: String,
    pub whatsapp_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemWithSeller {
    #[serde(flatten)]
    pub item: Item,
    pub seller: Option<Seller>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_url: Option<String>,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    title: String,
    description: String,
    price: f64,
    price_type: String,
    category: String,
    listing_type: String,
    condition: Option<String>,
    images: Vec<String>,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    seller_id: Option<Uuid>,
    seller_full_name: Option<String>,
    seller_department: Option<String>,
    seller_whatsapp: Option<String>,
}

impl TryFrom<ItemRow> for ItemWithSeller {
    type Error = UnknownVariant;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let seller = row.seller_id.map(|id| Seller {
            id,
            full_name: row.seller_full_name.unwrap_or_default(),
            department: row.seller_department.unwrap_or_default(),
            whatsapp_number: row.seller_whatsapp,
        });
        let contact_url = seller
            .as_ref()
            .and_then(|s| contact_url(s.whatsapp_number.as_deref(), &row.title));

        Ok(ItemWithSeller {
            item: Item {
                id: row.id,
                title: row.title,
                description: row.description,
                price: row.price,
                price_type: row.price_type.parse()?,
                category: row.category.parse()?,
                listing_type: row.listing_type.parse()?,
                condition: row.condition,
                images: row.images,
                user_id: row.user_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            seller,
            contact_url,
        })
    }
}

fn decode_rows(rows: Vec<ItemRow>) -> Result<Vec<ItemWithSeller>, sqlx::Error> {
    rows.into_iter()
        .map(|row| ItemWithSeller::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e))))
        .collect()
}

fn decode_row(row: ItemRow) -> Result<ItemWithSeller, sqlx::Error> {
    ItemWithSeller::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// `https://wa.me/<digits>?text=<greeting>` for sellers who left a WhatsApp number.
pub fn contact_url(whatsapp: Option<&str>, title: &str) -> Option<String> {
    let digits: String = whatsapp?.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let mut url = Url::parse("https://wa.me/").ok()?;
    url.set_path(&digits);
    url.query_pairs_mut().append_pair(
        "text",
        &format!("Hi, I'm interested in your listing \"{title}\" on the campus marketplace."),
    );
    Some(url.into())
}

/// Escapes LIKE wildcards so the search term is matched literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ItemFilter {
    pub category: Option<ItemCategory>,
    pub listing_type: Option<ListingType>,
    pub q: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(skip)]
    pub user_id: Option<Uuid>,
}

impl ItemFilter {
    pub fn validate(&self) -> Result<(), String> {
        for price in [self.min_price, self.max_price].into_iter().flatten() {
            if !price.is_finite() || price < 0.0 {
                return Err("Price filters must be non-negative numbers".into());
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err("min_price cannot exceed max_price".into());
            }
        }
        Ok(())
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    fn query(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {ITEM_COLUMNS} FROM items i {JOIN_SELLER} WHERE TRUE"
        ));

        if let Some(user_id) = self.user_id {
            builder.push(" AND i.user_id = ").push_bind(user_id);
        }
        if let Some(category) = self.category {
            builder.push(" AND i.category = ").push_bind(category.as_str());
        }
        if let Some(listing_type) = self.listing_type {
            builder
                .push(" AND i.listing_type = ")
                .push_bind(listing_type.as_str());
        }
        if let Some(term) = self.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", escape_like(term));
            builder
                .push(" AND (i.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR i.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(min) = self.min_price {
            builder.push(" AND i.price >= ").push_bind(min);
        }
        if let Some(max) = self.max_price {
            builder.push(" AND i.price <= ").push_bind(max);
        }

        builder
            .push(" ORDER BY i.created_at DESC LIMIT ")
            .push_bind(self.limit())
            .push(" OFFSET ")
            .push_bind(self.offset());
        builder
    }
}

fn clean_images(images: Vec<String>) -> Result<Vec<String>, String> {
    if images.len() > MAX_IMAGES {
        return Err(format!("At most {MAX_IMAGES} images are allowed"));
    }
    images
        .into_iter()
        .map(|raw| {
            let raw = raw.trim().to_string();
            match Url::parse(&raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(raw),
                _ => Err(format!("Invalid image URL: {raw}")),
            }
        })
        .collect()
}

fn clean_title(title: &str) -> Result<String, String> {
    let title = title.trim();
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE_CHARS {
        return Err(format!("Title must be 1 to {MAX_TITLE_CHARS} characters"));
    }
    Ok(title.to_string())
}

fn clean_description(description: &str) -> Result<String, String> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(format!(
            "Description must be at most {MAX_DESCRIPTION_CHARS} characters"
        ));
    }
    Ok(description.to_string())
}

fn check_price(price: f64) -> Result<f64, String> {
    if !price.is_finite() || price < 0.0 {
        return Err("Price must be a non-negative number".into());
    }
    Ok(price)
}

fn clean_condition(condition: Option<String>) -> Option<String> {
    condition
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub price_type: Option<PriceType>,
    pub category: ItemCategory,
    pub listing_type: ListingType,
    pub condition: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A listing that passed validation and is ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub price_type: PriceType,
    pub category: ItemCategory,
    pub listing_type: ListingType,
    pub condition: Option<String>,
    pub images: Vec<String>,
}

impl CreateItemRequest {
    pub fn validate(self) -> Result<NewItem, String> {
        Ok(NewItem {
            title: clean_title(&self.title)?,
            description: clean_description(&self.description)?,
            price: check_price(self.price)?,
            price_type: self.price_type.unwrap_or(PriceType::Fixed),
            category: self.category,
            listing_type: self.listing_type,
            condition: clean_condition(self.condition),
            images: clean_images(self.images)?,
        })
    }
}

/// The edit form as submitted; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub price_type: Option<PriceType>,
    pub category: Option<ItemCategory>,
    pub listing_type: Option<ListingType>,
    /// An empty string clears the condition.
    pub condition: Option<String>,
    pub images: Option<Vec<String>>,
}

/// Fields of an edit that differ from the stored listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub price_type: Option<PriceType>,
    pub category: Option<ItemCategory>,
    pub listing_type: Option<ListingType>,
    pub condition: Option<Option<String>>,
    pub images: Option<Vec<String>>,
}

fn changed<T: PartialEq>(new: Option<T>, current: &T) -> Option<T> {
    new.filter(|value| value != current)
}

impl ItemChanges {
    /// Validates the edit and keeps only the fields whose value actually changes.
    pub fn diff(current: &Item, edit: UpdateItemRequest) -> Result<Self, String> {
        let title = edit.title.as_deref().map(clean_title).transpose()?;
        let description = edit
            .description
            .as_deref()
            .map(clean_description)
            .transpose()?;
        let price = edit.price.map(check_price).transpose()?;
        let images = edit.images.map(clean_images).transpose()?;
        let condition = edit.condition.map(|c| clean_condition(Some(c)));

        Ok(ItemChanges {
            title: changed(title, &current.title),
            description: changed(description, &current.description),
            price: changed(price, &current.price),
            price_type: changed(edit.price_type, &current.price_type),
            category: changed(edit.category, &current.category),
            listing_type: changed(edit.listing_type, &current.listing_type),
            condition: changed(condition, &current.condition),
            images: changed(images, &current.images),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == ItemChanges::default()
    }

    fn query(&self, id: Uuid, user_id: Uuid) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("WITH i AS (UPDATE items SET ");
        let mut set = builder.separated(", ");
        if let Some(title) = &self.title {
            set.push("title = ").push_bind_unseparated(title.clone());
        }
        if let Some(description) = &self.description {
            set.push("description = ")
                .push_bind_unseparated(description.clone());
        }
        if let Some(price) = self.price {
            set.push("price = ").push_bind_unseparated(price);
        }
        if let Some(price_type) = self.price_type {
            set.push("price_type = ")
                .push_bind_unseparated(price_type.as_str());
        }
        if let Some(category) = self.category {
            set.push("category = ").push_bind_unseparated(category.as_str());
        }
        if let Some(listing_type) = self.listing_type {
            set.push("listing_type = ")
                .push_bind_unseparated(listing_type.as_str());
        }
        if let Some(condition) = &self.condition {
            set.push("condition = ")
                .push_bind_unseparated(condition.clone());
        }
        if let Some(images) = &self.images {
            set.push("images = ").push_bind_unseparated(images.clone());
        }
        set.push("updated_at = NOW()");

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(user_id)
            .push(format!(
                " RETURNING *) SELECT {ITEM_COLUMNS} FROM i {JOIN_SELLER}"
            ));
        builder
    }
}

impl ItemWithSeller {
    pub async fn list(pool: &PgPool, filter: &ItemFilter) -> Result<Vec<Self>, sqlx::Error> {
        let rows = filter
            .query()
            .build_query_as::<ItemRow>()
            .fetch_all(pool)
            .await?;
        decode_rows(rows)
    }

    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items i {JOIN_SELLER} WHERE i.id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        row.map(decode_row).transpose()
    }

    /// Looks the listing up only among the caller's own.
    pub async fn find_owned(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items i {JOIN_SELLER} WHERE i.id = $1 AND i.user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        row.map(decode_row).transpose()
    }

    pub async fn create(pool: &PgPool, user_id: Uuid, item: NewItem) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "WITH i AS ( \
                INSERT INTO items \
                    (title, description, price, price_type, category, listing_type, condition, images, user_id) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                RETURNING * \
             ) \
             SELECT {ITEM_COLUMNS} FROM i {JOIN_SELLER}"
        ))
        .bind(item.title)
        .bind(item.description)
        .bind(item.price)
        .bind(item.price_type.as_str())
        .bind(item.category.as_str())
        .bind(item.listing_type.as_str())
        .bind(item.condition)
        .bind(item.images)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        decode_row(row)
    }

    /// Writes only the changed columns; `None` when the listing is not the caller's.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        changes: &ItemChanges,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = changes
            .query(id, user_id)
            .build_query_as::<ItemRow>()
            .fetch_optional(pool)
            .await?;
        row.map(decode_row).transpose()
    }

    /// Returns whether a listing owned by `user_id` was removed.
    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteItemResponse {
    pub id: Uuid,
}
