//! Banner API Client
//!
//! `BannerApi` is the persistence seam. `HttpBannerApi` maps it onto the REST
//! endpoints through a pluggable `HttpTransport`; responses are decoded into
//! validated structs so a shape mismatch surfaces as `ApiError::Parse`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::geometry::CropRect;
use crate::models::{Banner, BannerId, CropPut, CropRecord, NewBanner, Settings};
use crate::presets::PresetKey;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Parse(String),
}

pub type CropMap = BTreeMap<PresetKey, CropRecord>;

#[async_trait]
pub trait BannerApi: Send + Sync {
    /// `GET /api/banners`
    async fn list_banners(&self) -> Result<Vec<Banner>, ApiError>;

    /// `POST /api/banners`
    async fn create_banner(&self, upload: &NewBanner) -> Result<Banner, ApiError>;

    /// `DELETE /api/banners/{id}`
    async fn delete_banner(&self, id: &BannerId) -> Result<(), ApiError>;

    /// `GET /api/banner-settings`
    async fn get_settings(&self) -> Result<Settings, ApiError>;

    /// `PUT /api/banner-settings`
    async fn update_settings(&self, settings: &Settings) -> Result<Settings, ApiError>;

    /// `GET /api/banners/{id}/crops`
    async fn fetch_crops(&self, id: &BannerId) -> Result<CropMap, ApiError>;

    /// `PUT /api/banners/{id}/crop`, an upsert keyed on (id, preset).
    async fn put_crop(
        &self,
        id: &BannerId,
        preset: PresetKey,
        crop: &CropRect,
    ) -> Result<CropRecord, ApiError>;
}

// --- HTTP mapping ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text { name: String, value: String },
    File { name: String, filename: String, content_type: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Multipart(Vec<Part>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one request. Transport failures map to `ApiError::Network`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct HttpBannerApi<T> {
    transport: T,
}

impl<T: HttpTransport> HttpBannerApi<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call(&self, method: Method, path: String, body: Body) -> Result<String, ApiError> {
        debug!(?method, %path, "Sending request");
        let response = self
            .transport
            .send(HttpRequest { method, path: path.clone(), body })
            .await?;

        match response.status {
            200..=299 => Ok(response.body),
            404 => Err(ApiError::NotFound(path)),
            400 | 409 | 413 | 415 | 422 => Err(ApiError::Rejected(format!(
                "{:?} {} returned {}: {}",
                method, path, response.status, response.body
            ))),
            status => Err(ApiError::Network(format!("{:?} {} returned {}", method, path, status))),
        }
    }
}

fn decode<R: DeserializeOwned>(body: &str) -> Result<R, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))
}

fn to_json<S: serde::Serialize>(value: &S) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Parse(e.to_string()))
}

/// Decode a crop map, skipping presets this build does not know about.
fn decode_crops(body: &str) -> Result<CropMap, ApiError> {
    let raw: BTreeMap<String, Value> = decode(body)?;
    let mut crops = CropMap::new();
    for (key, value) in raw {
        let Ok(preset) = key.parse::<PresetKey>() else {
            warn!(preset = %key, "Skipping crop for unknown preset");
            continue;
        };
        let record: CropRecord =
            serde_json::from_value(value).map_err(|e| ApiError::Parse(e.to_string()))?;
        if record.preset_key != preset {
            return Err(ApiError::Parse(format!(
                "crop under {} claims preset {}",
                preset, record.preset_key
            )));
        }
        record.check().map_err(ApiError::Parse)?;
        crops.insert(preset, record);
    }
    Ok(crops)
}

#[async_trait]
impl<T: HttpTransport> BannerApi for HttpBannerApi<T> {
    async fn list_banners(&self) -> Result<Vec<Banner>, ApiError> {
        let body = self.call(Method::Get, "/api/banners".to_string(), Body::Empty).await?;
        let banners: Vec<Banner> = decode(&body)?;
        for banner in &banners {
            banner.check().map_err(ApiError::Parse)?;
        }
        Ok(banners)
    }

    async fn create_banner(&self, upload: &NewBanner) -> Result<Banner, ApiError> {
        let mut parts = vec![Part::File {
            name: "file".to_string(),
            filename: upload.file.filename.clone(),
            content_type: upload.file.mime_type.clone(),
            bytes: upload.file.bytes().to_vec(),
        }];
        let text = |name: &str, value: String| Part::Text { name: name.to_string(), value };
        parts.push(text("active", upload.metadata.active.to_string()));
        parts.push(text("checksum", upload.checksum.clone()));
        if let Some(title) = &upload.metadata.title {
            parts.push(text("title", title.clone()));
        }
        if let Some(link) = &upload.metadata.link_url {
            parts.push(text("linkUrl", link.clone()));
        }
        if let Some(dims) = upload.natural {
            parts.push(text("naturalWidth", dims.width.to_string()));
            parts.push(text("naturalHeight", dims.height.to_string()));
        }

        let body = self
            .call(Method::Post, "/api/banners".to_string(), Body::Multipart(parts))
            .await?;
        let banner: Banner = decode(&body)?;
        banner.check().map_err(ApiError::Parse)?;
        Ok(banner)
    }

    async fn delete_banner(&self, id: &BannerId) -> Result<(), ApiError> {
        self.call(Method::Delete, format!("/api/banners/{}", id), Body::Empty).await?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings, ApiError> {
        let body = self
            .call(Method::Get, "/api/banner-settings".to_string(), Body::Empty)
            .await?;
        let settings: Settings = decode(&body)?;
        settings.check().map_err(ApiError::Parse)?;
        Ok(settings)
    }

    async fn update_settings(&self, settings: &Settings) -> Result<Settings, ApiError> {
        let body = self
            .call(
                Method::Put,
                "/api/banner-settings".to_string(),
                Body::Json(to_json(settings)?),
            )
            .await?;
        let updated: Settings = decode(&body)?;
        updated.check().map_err(ApiError::Parse)?;
        Ok(updated)
    }

    async fn fetch_crops(&self, id: &BannerId) -> Result<CropMap, ApiError> {
        let body = self
            .call(Method::Get, format!("/api/banners/{}/crops", id), Body::Empty)
            .await?;
        decode_crops(&body)
    }

    async fn put_crop(
        &self,
        id: &BannerId,
        preset: PresetKey,
        crop: &CropRect,
    ) -> Result<CropRecord, ApiError> {
        let payload = CropPut {
            preset_key: preset,
            rect: crop.natural,
            normalized: crop.normalized,
        };
        let body = self
            .call(
                Method::Put,
                format!("/api/banners/{}/crop", id),
                Body::Json(to_json(&payload)?),
            )
            .await?;
        let record: CropRecord = decode(&body)?;
        record.check().map_err(ApiError::Parse)?;
        if record.preset_key != preset {
            return Err(ApiError::Parse(format!(
                "saved {} but server answered for {}",
                preset, record.preset_key
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Dimensions, NaturalRect};
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned responses and records what was sent.
    struct CannedTransport {
        responses: Mutex<Vec<HttpResponse>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl CannedTransport {
        fn new(responses: Vec<(u16, String)>) -> Self {
            let mut responses: Vec<_> = responses
                .into_iter()
                .map(|(status, body)| HttpResponse { status, body })
                .collect();
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                sent: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for CannedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.sent.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ApiError::Network("connection refused".to_string()))
        }
    }

    fn crop_json(preset: &str) -> Value {
        json!({
            "presetKey": preset,
            "box": {"left": 0, "top": 156, "width": 1920, "height": 768},
            "normalized": {"x": 0.0, "y": 0.144, "width": 1.0, "height": 0.711},
            "revision": "abc",
            "updatedAt": "2026-03-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_put_crop_request_shape() {
        let api = HttpBannerApi::new(CannedTransport::new(vec![(
            200,
            crop_json("wide1920").to_string(),
        )]));
        let rect = NaturalRect { left: 0, top: 156, width: 1920, height: 768 };
        let crop = CropRect { natural: rect, normalized: rect.normalized(Dimensions::new(1920, 1080)) };

        let record = api.put_crop(&"b1".into(), PresetKey::Wide1920, &crop).await.unwrap();
        assert_eq!(record.rect, rect);

        let sent = api.transport().sent.lock().unwrap();
        assert_eq!(sent[0].method, Method::Put);
        assert_eq!(sent[0].path, "/api/banners/b1/crop");
        let Body::Json(body) = &sent[0].body else { panic!("expected json body") };
        assert_eq!(body["presetKey"], "wide1920");
        assert_eq!(body["box"]["height"], 768);
    }

    #[tokio::test]
    async fn test_fetch_crops_skips_unknown_preset() {
        let body = json!({"wide1920": crop_json("wide1920"), "mobile480": crop_json("mobile480")});
        let api = HttpBannerApi::new(CannedTransport::new(vec![(200, body.to_string())]));

        let crops = api.fetch_crops(&"b1".into()).await.unwrap();
        assert_eq!(crops.keys().collect::<Vec<_>>(), vec![&PresetKey::Wide1920]);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_parse_error() {
        let api = HttpBannerApi::new(CannedTransport::new(vec![(
            200,
            json!([{"id": "b1", "url": 7}]).to_string(),
        )]));
        assert!(matches!(api.list_banners().await, Err(ApiError::Parse(_))));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let api = HttpBannerApi::new(CannedTransport::new(vec![
            (404, String::new()),
            (500, String::new()),
            (422, "box outside image".to_string()),
        ]));
        let id: BannerId = "gone".into();

        assert_eq!(
            api.delete_banner(&id).await,
            Err(ApiError::NotFound("/api/banners/gone".to_string()))
        );
        assert!(matches!(api.get_settings().await, Err(ApiError::Network(_))));
        assert!(matches!(api.fetch_crops(&id).await, Err(ApiError::Rejected(_))));
        // Transport exhausted
        assert!(matches!(api.list_banners().await, Err(ApiError::Network(_))));
    }

    #[tokio::test]
    async fn test_create_sends_multipart() {
        let banner = json!({
            "id": "b9",
            "url": "/uploads/b9/hero.png",
            "mimeType": "image/png",
            "size": 3,
            "createdAt": "2026-03-01T00:00:00Z",
            "naturalWidth": 40,
            "naturalHeight": 16
        });
        let api = HttpBannerApi::new(CannedTransport::new(vec![(201, banner.to_string())]));
        let file = crate::upload::UploadFile::new("hero.png", "image/png", vec![1, 2, 3]);
        let upload = NewBanner {
            checksum: file.checksum(),
            file,
            metadata: Default::default(),
            natural: Some(Dimensions::new(40, 16)),
        };

        let created = api.create_banner(&upload).await.unwrap();
        assert_eq!(created.id, BannerId::from("b9"));

        let sent = api.transport().sent.lock().unwrap();
        let Body::Multipart(parts) = &sent[0].body else { panic!("expected multipart") };
        assert!(parts.iter().any(|p| matches!(p, Part::File { filename, .. } if filename == "hero.png")));
        assert!(parts.contains(&Part::Text { name: "naturalWidth".to_string(), value: "40".to_string() }));
    }
}
