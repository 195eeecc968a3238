//! Runtime configuration loaded from the persistent store at startup
//! (spec §3 `VendorProfile`, §6 persistent config keys).

use crate::store::{namespace, Store};
use std::sync::Arc;

/// The selected LLM vendor, chosen once at startup from `cc_provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorProfile {
    Anthropic,
    OpenAi,
    OpenRouter,
}

impl VendorProfile {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAi),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
        }
    }
}

/// The subset of config needed to talk to the LLM.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub vendor: VendorProfile,
    pub api_key: String,
    pub model: String,
}

/// The subset of config needed to talk to the chat API.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub token: String,
    /// `None` until the operator has authorised a peer via `tc_chat_id`.
    pub authorised_chat_id: Option<i64>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub llm: Option<LlmConfig>,
    pub chat: Option<ChatConfig>,
    pub timezone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("invalid config value for {0}")]
    Invalid(&'static str),
}

/// Load the runtime config from the store. Missing LLM/chat config is not an
/// error — callers (the agent, the chat poller) degrade to an
/// "unconfigured" user-visible message instead, per spec §7 `AuthError`.
pub async fn load(store: &Arc<dyn Store>) -> Result<RuntimeConfig, ConfigError> {
    let provider = store.get_string(namespace::LLM_CONFIG, "provider").await?;
    let api_key = store.get_string(namespace::LLM_CONFIG, "api_key").await?;
    let model = store.get_string(namespace::LLM_CONFIG, "model").await?;

    let llm = match (provider, api_key, model) {
        (Some(p), Some(k), Some(m)) if !k.trim().is_empty() => {
            let vendor = VendorProfile::parse(&p).ok_or(ConfigError::Invalid("cc_provider"))?;
            Some(LlmConfig {
                vendor,
                api_key: k,
                model: m,
            })
        }
        _ => None,
    };

    let token = store.get_string(namespace::CHAT_CONFIG, "token").await?;
    let chat_id_raw = store.get_string(namespace::CHAT_CONFIG, "chat_id").await?;
    let chat = token.map(|token| {
        let authorised_chat_id = chat_id_raw
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|id| *id != 0);
        ChatConfig {
            token,
            authorised_chat_id,
        }
    });

    let timezone = store.get_string(namespace::TIMEZONE, "posix").await?;

    Ok(RuntimeConfig { llm, chat, timezone })
}

/// Persist the LLM vendor/key/model triple.
pub async fn set_llm_config(
    store: &Arc<dyn Store>,
    vendor: VendorProfile,
    api_key: &str,
    model: &str,
) -> Result<(), ConfigError> {
    store
        .put_string(namespace::LLM_CONFIG, "provider", vendor.as_str())
        .await?;
    store.put_string(namespace::LLM_CONFIG, "api_key", api_key).await?;
    store.put_string(namespace::LLM_CONFIG, "model", model).await?;
    Ok(())
}

/// Persist the chat bot token and, optionally, the authorised chat id.
pub async fn set_chat_config(
    store: &Arc<dyn Store>,
    token: &str,
    authorised_chat_id: Option<i64>,
) -> Result<(), ConfigError> {
    store.put_string(namespace::CHAT_CONFIG, "token", token).await?;
    if let Some(id) = authorised_chat_id {
        store
            .put_string(namespace::CHAT_CONFIG, "chat_id", &id.to_string())
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn missing_llm_config_yields_none() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let cfg = load(&store).await.unwrap();
        assert!(cfg.llm.is_none());
        assert!(cfg.chat.is_none());
    }

    #[tokio::test]
    async fn round_trips_llm_config() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        set_llm_config(&store, VendorProfile::Anthropic, "sk-ant-x", "claude-sonnet-4-5")
            .await
            .unwrap();
        let cfg = load(&store).await.unwrap();
        let llm = cfg.llm.unwrap();
        assert_eq!(llm.vendor, VendorProfile::Anthropic);
        assert_eq!(llm.model, "claude-sonnet-4-5");
    }

    #[tokio::test]
    async fn zero_chat_id_is_treated_as_unauthorised() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        set_chat_config(&store, "tok", Some(0)).await.unwrap();
        let cfg = load(&store).await.unwrap();
        assert_eq!(cfg.chat.unwrap().authorised_chat_id, None);
    }
}
