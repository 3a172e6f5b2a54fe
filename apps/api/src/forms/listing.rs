//! Post-rental form and listing image uploads.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::validation::{FieldError, FormErrors, Validate};
use crate::backend::{Backend, Query};
use crate::errors::AppError;
use crate::models::listing::{Listing, ListingStatus, NewListing, PropertyType};
use crate::models::{decode_row, Record};

pub const IMAGE_BUCKET: &str = "property-images";
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
/// Request body cap for one multipart upload of up to four images.
pub const MAX_UPLOAD_BYTES: usize = 4 * MAX_IMAGE_BYTES + 64 * 1024;
pub const MAX_BEDROOMS: i32 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct ListingForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub town: String,
    #[serde(default)]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub bedrooms: i32,
    #[serde(default)]
    pub monthly_rent: i64,
    #[serde(default)]
    pub deposit: Option<i64>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

impl Validate for ListingForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.require("title", &self.title);
        errors.require("county", &self.county);
        errors.require("town", &self.town);
        errors.check(
            self.property_type.is_some(),
            "property_type",
            "Property type is required",
        );
        errors.require("description", &self.description);
        errors.check(
            (0..=MAX_BEDROOMS).contains(&self.bedrooms),
            "bedrooms",
            "Bedrooms must be between 0 and 20",
        );
        errors.check(
            self.monthly_rent > 0,
            "monthly_rent",
            "Monthly rent must be greater than 0",
        );
        errors.check(
            self.deposit.map(|d| d >= 0).unwrap_or(true),
            "deposit",
            "Deposit cannot be negative",
        );
        errors.into_result()
    }
}

impl ListingForm {
    /// Trimmed insert row. Call only after `validate` has passed.
    pub fn into_new_listing(self, owner_id: Uuid) -> Result<NewListing, Vec<FieldError>> {
        let property_type = self.property_type.ok_or_else(|| {
            vec![FieldError {
                field: "property_type".into(),
                message: "Property type is required".into(),
            }]
        })?;

        let mut amenities: Vec<String> = Vec::new();
        for amenity in self.amenities {
            let amenity = amenity.trim().to_string();
            if !amenity.is_empty() && !amenities.contains(&amenity) {
                amenities.push(amenity);
            }
        }

        Ok(NewListing {
            id: Uuid::new_v4(),
            owner_id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            county: self.county.trim().to_string(),
            town: self.town.trim().to_string(),
            property_type,
            bedrooms: self.bedrooms,
            monthly_rent: self.monthly_rent,
            deposit: self.deposit,
            amenities,
            status: ListingStatus::Available,
        })
    }
}

/// File extension for an accepted image content type.
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

pub fn validate_image(content_type: &str, size: usize) -> Result<&'static str, Vec<FieldError>> {
    let mut errors = FormErrors::new();
    let ext = image_extension(content_type);
    errors.check(ext.is_some(), "image", "Only JPEG, PNG or WebP images are allowed");
    errors.check(size > 0, "image", "Image is empty");
    errors.check(size <= MAX_IMAGE_BYTES, "image", "Image must be 5 MB or smaller");
    errors.into_result()?;
    ext.ok_or_else(Vec::new)
}

pub fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// `<owner>/<listing>/<uuid>.<ext>` inside the image bucket.
pub fn image_path(owner_id: Uuid, listing_id: Uuid, ext: &str) -> String {
    format!("{owner_id}/{listing_id}/{}.{ext}", Uuid::new_v4())
}

pub async fn create_listing(
    backend: &dyn Backend,
    token: &str,
    owner_id: Uuid,
    form: ListingForm,
) -> Result<Listing, AppError> {
    form.validate()?;
    let listing = form.into_new_listing(owner_id)?;

    let rows = backend
        .insert(Some(token), Listing::TABLE, json!(listing))
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("listing insert returned no row")))?;
    let created: Listing = decode_row(row)?;
    info!(listing_id = %created.id, %owner_id, "Listing posted");
    Ok(created)
}

async fn owned_listing(
    backend: &dyn Backend,
    token: &str,
    owner_id: Uuid,
    listing_id: Uuid,
) -> Result<Listing, AppError> {
    let rows = backend
        .select(
            Some(token),
            &Query::table(Listing::TABLE).eq("id", listing_id).limit(1),
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Listing {listing_id} not found")))?;
    let listing: Listing = decode_row(row)?;
    if listing.owner_id != owner_id {
        warn!(%listing_id, %owner_id, "Image upload to someone else's listing");
        return Err(AppError::Forbidden);
    }
    Ok(listing)
}

/// Uploads one image and appends its storage path to the listing.
pub async fn attach_image(
    backend: &dyn Backend,
    token: &str,
    owner_id: Uuid,
    listing_id: Uuid,
    content_type: &str,
    body: Bytes,
) -> Result<Listing, AppError> {
    let ext = validate_image(content_type, body.len())?;
    let listing = owned_listing(backend, token, owner_id, listing_id).await?;

    let path = image_path(owner_id, listing_id, ext);
    backend
        .upload(Some(token), IMAGE_BUCKET, &path, content_type, body)
        .await?;

    let mut image_paths = listing.image_paths;
    image_paths.push(path.clone());
    let rows = backend
        .update(
            Some(token),
            &Query::table(Listing::TABLE).eq("id", listing_id),
            json!({ "image_paths": image_paths }),
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Listing {listing_id} not found")))?;
    info!(%listing_id, %path, "Listing image uploaded");
    Ok(decode_row(row)?)
}

/// Downloads one of a listing's images by file name. Only paths recorded
/// on the listing are served.
pub async fn fetch_image(
    backend: &dyn Backend,
    token: Option<&str>,
    listing_id: Uuid,
    file_name: &str,
) -> Result<(&'static str, Bytes), AppError> {
    let rows = backend
        .select(
            token,
            &Query::table(Listing::TABLE).eq("id", listing_id).limit(1),
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Listing {listing_id} not found")))?;
    let listing: Listing = decode_row(row)?;

    let path = listing
        .image_paths
        .iter()
        .find(|p| p.rsplit('/').next() == Some(file_name))
        .ok_or_else(|| AppError::NotFound(format!("Image {file_name} not found")))?;
    let body = backend.download(token, IMAGE_BUCKET, path).await?;
    Ok((content_type_for(path), body))
}
