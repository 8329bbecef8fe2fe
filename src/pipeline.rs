//! Request Pipeline (C5): validates requests, tries the cache, falls back
//! to translation engines, then cache-writes and enqueues for sync (§4.5).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::translation_key;
use crate::engine::{CacheEngine, GetOptions, GetOutcome, SetOptions};
use crate::entry::CacheBody;
use crate::error::{CacheError, Result};
use crate::sync::SyncManager;

/// What a translation engine (local or remote) hands back to the Pipeline.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub translated_text: String,
    pub confidence: String,
}

#[derive(Debug, Clone)]
pub struct AudioEngineOutput {
    pub translated_text: String,
    pub confidence: String,
    pub audio_bytes: Vec<u8>,
}

/// The seam between the Pipeline and whatever actually performs
/// translation (a local model, a remote proxy, or a test double). Mirrors
/// the small-trait-at-the-seam shape the cache backends use.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str, context: &str) -> Result<EngineOutput>;

    async fn translate_audio(
        &self,
        audio_bytes: &[u8],
        source_lang: &str,
        target_lang: &str,
        context: &str,
    ) -> Result<AudioEngineOutput>;
}

#[derive(Serialize)]
struct RemoteTranslateRequest<'a> {
    text: &'a str,
    #[serde(rename = "sourceLang")]
    source_lang: &'a str,
    #[serde(rename = "targetLang")]
    target_lang: &'a str,
    context: &'a str,
}

#[derive(Deserialize)]
struct RemoteTranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
    confidence: String,
}

#[derive(Serialize)]
struct RemoteAudioRequest<'a> {
    #[serde(rename = "audioBytes")]
    audio_bytes: &'a [u8],
    #[serde(rename = "sourceLang")]
    source_lang: &'a str,
    #[serde(rename = "targetLang")]
    target_lang: &'a str,
    context: &'a str,
}

#[derive(Deserialize)]
struct RemoteAudioResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
    confidence: String,
    #[serde(rename = "audioBytes")]
    audio_bytes: Vec<u8>,
}

/// Delegates to the same cloud HTTP surface the Sync Manager talks to,
/// hitting the translation proxy endpoint rather than the four sync-
/// specific endpoints (§6.3's REST surface is C4's; this is C5's own leg
/// of the same cloud API).
pub struct RemoteTranslationEngine {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteTranslationEngine {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TranslationEngine for RemoteTranslationEngine {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str, context: &str) -> Result<EngineOutput> {
        let url = format!("{}/translate", self.base_url);
        let body = RemoteTranslateRequest {
            text,
            source_lang,
            target_lang,
            context,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;
        let parsed: RemoteTranslateResponse = response
            .json()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;
        Ok(EngineOutput {
            translated_text: parsed.translated_text,
            confidence: parsed.confidence,
        })
    }

    async fn translate_audio(
        &self,
        audio_bytes: &[u8],
        source_lang: &str,
        target_lang: &str,
        context: &str,
    ) -> Result<AudioEngineOutput> {
        let url = format!("{}/translate/audio", self.base_url);
        let body = RemoteAudioRequest {
            audio_bytes,
            source_lang,
            target_lang,
            context,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;
        let parsed: RemoteAudioResponse = response
            .json()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;
        Ok(AudioEngineOutput {
            translated_text: parsed.translated_text,
            confidence: parsed.confidence,
            audio_bytes: parsed.audio_bytes,
        })
    }
}

/// Deterministic test double: never touches the network, always succeeds.
pub struct EchoTranslationEngine;

#[async_trait]
impl TranslationEngine for EchoTranslationEngine {
    async fn translate(&self, text: &str, _source_lang: &str, target_lang: &str, _context: &str) -> Result<EngineOutput> {
        Ok(EngineOutput {
            translated_text: format!("[{target_lang}] {text}"),
            confidence: "medium".to_string(),
        })
    }

    async fn translate_audio(
        &self,
        audio_bytes: &[u8],
        _source_lang: &str,
        target_lang: &str,
        _context: &str,
    ) -> Result<AudioEngineOutput> {
        Ok(AudioEngineOutput {
            translated_text: format!("[{target_lang}] audio"),
            confidence: "medium".to_string(),
            audio_bytes: audio_bytes.to_vec(),
        })
    }
}

fn audio_key(source_lang: &str, target_lang: &str, context: &str, audio_bytes: &[u8]) -> String {
    let digest = md5::compute(audio_bytes);
    format!("{source_lang}:{target_lang}:{context}:{digest:x}")
}

/// Where a non-cached result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Local,
    Cloud,
}

#[derive(Debug, Clone)]
pub struct TranslationResponse {
    pub translated_text: String,
    pub confidence: String,
    pub from_cache: bool,
    pub source: Option<ResultSource>,
}

#[derive(Debug, Clone)]
pub struct AudioTranslationResponse {
    pub translated_text: String,
    pub confidence: String,
    pub audio_bytes: Vec<u8>,
    pub from_cache: bool,
    pub source: Option<ResultSource>,
}

/// Request Pipeline (C5): the only component that touches both the Cache
/// Engine and the translation engines / Sync Manager.
pub struct RequestPipeline {
    engine: Arc<CacheEngine>,
    sync: Arc<SyncManager>,
    local_engine: Arc<dyn TranslationEngine>,
    remote_engine: Arc<dyn TranslationEngine>,
}

impl RequestPipeline {
    #[must_use]
    pub fn new(
        engine: Arc<CacheEngine>,
        sync: Arc<SyncManager>,
        local_engine: Arc<dyn TranslationEngine>,
        remote_engine: Arc<dyn TranslationEngine>,
    ) -> Self {
        Self {
            engine,
            sync,
            local_engine,
            remote_engine,
        }
    }

    fn validate(text: &str, source_lang: &str, target_lang: &str) -> Result<()> {
        if text.is_empty() || source_lang.is_empty() || target_lang.is_empty() {
            return Err(CacheError::BadRequest(
                "text, sourceLang, and targetLang must all be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    /// §4.5 `translateRequest`.
    pub async fn translate_request(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        context: &str,
    ) -> Result<TranslationResponse> {
        Self::validate(text, source_lang, target_lang)?;
        let key = translation_key(source_lang, target_lang, context, text);

        if let Some(cached) = self.lookup_translation(&key)? {
            return Ok(TranslationResponse {
                translated_text: cached.0,
                confidence: cached.1,
                from_cache: true,
                source: None,
            });
        }

        let (output, source) = match self.local_engine.translate(text, source_lang, target_lang, context).await {
            Ok(output) => (output, ResultSource::Local),
            Err(e) => {
                debug!("local translation engine failed, falling back to cloud: {}", e);
                let output = self
                    .remote_engine
                    .translate(text, source_lang, target_lang, context)
                    .await?;
                (output, ResultSource::Cloud)
            }
        };

        let body = CacheBody::Translation {
            translated_text: output.translated_text.clone(),
            confidence: output.confidence.clone(),
            context: context.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            merge_source: None,
            merge_timestamp: None,
        };
        self.commit(&key, &body).await?;

        Ok(TranslationResponse {
            translated_text: output.translated_text,
            confidence: output.confidence,
            from_cache: false,
            source: Some(source),
        })
    }

    /// §4.5 `translateAudio`: same shape, the cache body additionally
    /// carries the synthesized audio response.
    pub async fn translate_audio(
        &self,
        audio_bytes: &[u8],
        source_lang: &str,
        target_lang: &str,
        context: &str,
    ) -> Result<AudioTranslationResponse> {
        if audio_bytes.is_empty() || source_lang.is_empty() || target_lang.is_empty() {
            return Err(CacheError::BadRequest(
                "audioBytes, sourceLang, and targetLang must all be non-empty".to_string(),
            ));
        }
        let key = audio_key(source_lang, target_lang, context, audio_bytes);

        if let Some(cached) = self.lookup_audio(&key)? {
            return Ok(AudioTranslationResponse {
                translated_text: cached.0,
                confidence: cached.1,
                audio_bytes: cached.2,
                from_cache: true,
                source: None,
            });
        }

        let (output, source) = match self
            .local_engine
            .translate_audio(audio_bytes, source_lang, target_lang, context)
            .await
        {
            Ok(output) => (output, ResultSource::Local),
            Err(e) => {
                debug!("local audio engine failed, falling back to cloud: {}", e);
                let output = self
                    .remote_engine
                    .translate_audio(audio_bytes, source_lang, target_lang, context)
                    .await?;
                (output, ResultSource::Cloud)
            }
        };

        let body = CacheBody::Audio {
            translated_text: output.translated_text.clone(),
            confidence: output.confidence.clone(),
            context: context.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            audio_bytes: output.audio_bytes.clone(),
            merge_source: None,
            merge_timestamp: None,
        };
        self.commit(&key, &body).await?;

        Ok(AudioTranslationResponse {
            translated_text: output.translated_text,
            confidence: output.confidence,
            audio_bytes: output.audio_bytes,
            from_cache: false,
            source: Some(source),
        })
    }

    fn lookup_translation(&self, key: &str) -> Result<Option<(String, String)>> {
        match self.engine.get(crate::entry::CacheClass::Translation, key, &GetOptions::default()) {
            Ok(GetOutcome::Hit(entry)) => match crate::codec::decode(&entry.payload, entry.is_compressed)? {
                CacheBody::Translation {
                    translated_text, confidence, ..
                } => Ok(Some((translated_text, confidence))),
                CacheBody::Audio { .. } => Ok(None),
            },
            Ok(GetOutcome::Archived { .. }) | Err(CacheError::NotFound | CacheError::CacheDisabled) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn lookup_audio(&self, key: &str) -> Result<Option<(String, String, Vec<u8>)>> {
        match self.engine.get(crate::entry::CacheClass::Audio, key, &GetOptions::default()) {
            Ok(GetOutcome::Hit(entry)) => match crate::codec::decode(&entry.payload, entry.is_compressed)? {
                CacheBody::Audio {
                    translated_text,
                    confidence,
                    audio_bytes,
                    ..
                } => Ok(Some((translated_text, confidence, audio_bytes))),
                CacheBody::Translation { .. } => Ok(None),
            },
            Ok(GetOutcome::Archived { .. }) | Err(CacheError::NotFound | CacheError::CacheDisabled) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn commit(&self, key: &str, body: &CacheBody) -> Result<()> {
        let class = match body {
            CacheBody::Translation { .. } => crate::entry::CacheClass::Translation,
            CacheBody::Audio { .. } => crate::entry::CacheClass::Audio,
        };
        self.engine.set(
            class,
            key,
            body,
            &SetOptions {
                needs_sync: true,
                ..Default::default()
            },
        )?;

        let payload = serde_json::to_value(body).map_err(|e| CacheError::Codec(e.to_string()))?;
        if let Err(e) = self.sync.queue_translation(key, payload).await {
            warn!("failed to enqueue sync record for {}: {}", key, e);
        }
        Ok(())
    }
}
