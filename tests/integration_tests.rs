//! End-to-end: real listeners, the reference backends and an HTTP client.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use omni_serve::audio::wav::encode_wav;
use omni_serve::config::{TextServiceConfig, TtsServiceConfig};
use omni_serve::patcher::patch_config;
use omni_serve::server::{openai_api, tts_api};

fn write_checkpoint(dir: &Path, config: Value) {
    fs::write(dir.join("config.json"), config.to_string()).unwrap();
    fs::write(dir.join("model-00001-of-00001.safetensors"), vec![0u8; 64]).unwrap();
}

async fn spawn_server(app: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn text_service(model_path: &Path) -> (SocketAddr, Arc<openai_api::AppState>) {
    let state = Arc::new(openai_api::AppState::new(TextServiceConfig {
        model_path: model_path.to_path_buf(),
        device: "cpu".to_string(),
        ..TextServiceConfig::default()
    }));
    state.start_default_loader().unwrap().await.unwrap();
    let addr = spawn_server(openai_api::build_router(state.clone())).await;
    (addr, state)
}

#[tokio::test]
async fn test_chat_round_trip_over_http() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(
        dir.path(),
        json!({"architectures": ["Qwen3OmniMoeForConditionalGeneration"], "model_type": "qwen3_omni_moe"}),
    );
    let (addr, _state) = text_service(dir.path()).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["device"], "cpu");

    let response = client
        .post(format!("http://{addr}/v1/chat/completions"))
        .json(&json!({
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hello, world"}
            ],
            "max_tokens": 100,
            "temperature": 0.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello, world");
    let usage = &body["usage"];
    assert_eq!(
        usage["total_tokens"].as_u64().unwrap(),
        usage["prompt_tokens"].as_u64().unwrap() + usage["completion_tokens"].as_u64().unwrap()
    );
}

#[tokio::test]
async fn test_prompt_longer_than_context_is_500() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), json!({"model_type": "qwen3_omni_moe"}));

    let state = Arc::new(openai_api::AppState::new(TextServiceConfig {
        model_path: dir.path().to_path_buf(),
        device: "cpu".to_string(),
        max_model_len: 32,
        ..TextServiceConfig::default()
    }));
    state.start_default_loader().unwrap().await.unwrap();
    let addr = spawn_server(openai_api::build_router(state)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/inference/text"))
        .json(&json!({"text": "x".repeat(64)}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let response = client
        .post(format!("http://{addr}/v1/chat/completions"))
        .json(&json!({
            "messages": [{"role": "user", "content": "x".repeat(64)}],
            "stream": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("exceeds max model length"));
}

#[tokio::test]
async fn test_unpatched_checkpoint_fails_until_patched() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(
        dir.path(),
        json!({
            "architectures": ["Qwen3OmniMoeForConditionalGeneration"],
            "talker_config": {"code_predictor_config": {"hidden_size": 1024}}
        }),
    );

    let (addr, _state) = text_service(dir.path()).await;
    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "unhealthy");
    assert!(health["error"]
        .as_str()
        .unwrap()
        .contains("use_sliding_window"));

    patch_config(dir.path()).unwrap();

    // A fresh process picks up the patched config.
    let (addr, _state) = text_service(dir.path()).await;
    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_voice_clone_over_http() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), json!({"model_type": "qwen3_tts"}));
    let reference = dir.path().join("reference.wav");
    fs::write(&reference, encode_wav(&[1000; 1600], 16_000).unwrap()).unwrap();

    let state = Arc::new(tts_api::AppState::new(TtsServiceConfig {
        model_path: dir.path().to_path_buf(),
        cache_dir: dir.path().join("cache"),
        reference_audio: reference,
        ..TtsServiceConfig::default()
    }));
    state.start_default_loader().unwrap().await.unwrap();
    let addr = spawn_server(tts_api::build_router(state)).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("http://{addr}/v1/tts"))
        .json(&json!({"text": "Hello there, this is ten words of text to speak."}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["real_model"], true);
    assert_eq!(body["sample_rate"], 16_000);

    let response = client
        .post(format!("http://{addr}/v1/audio/speech"))
        .json(&json!({"input": "Hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "audio/wav");
    let wav = response.bytes().await.unwrap();
    assert_eq!(&wav[8..12], b"WAVE");
}
