use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const REFERENCE_TEXT: &str = "Section 01 Medical Emergencies

CHAPTER 1
Recognising the Critically Ill Child
- Assess airway, breathing and circulation in every child
- Neonatal heart rate is normally between 100 and 160 beats per minute

CHAPTER 2
Cardiopulmonary Resuscitation
- Compress at 100-120 per minute in children

CHAPTER 3
Drug Overdose and Poisoning
- N-acetylcysteine is the antidote for paracetamol overdose";

fn chx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("chx");
    path
}

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("section01.txt"), REFERENCE_TEXT).unwrap();

    let config_content = format!(
        r#"[corpus]
reference_text = "section01.txt"

[embedding]
provider = "hash"
dims = 384

[server]
bind = "127.0.0.1:7341"
{}"#,
        extra
    );

    let config_path = config_dir.join("chx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_chx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = chx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run chx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, stdout))
}

#[test]
fn test_calc() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_chx(&config_path, &["calc", "25"]);
    assert!(success, "calc failed: {}", stderr);
    assert!(stdout.contains("1600 mL"), "got: {}", stdout);
}

#[test]
fn test_calc_rejects_non_positive() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, _, success) = run_chx(&config_path, &["calc", "--", "-3"]);
    assert!(!success);
}

#[test]
fn test_classify_json() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, _, success) = run_chx(
        &config_path,
        &["--json", "classify", "Emergency: cardiac arrest on the ward"],
    );
    assert!(success);
    let v = json(&stdout);
    assert_eq!(v["route"], "emergency");
    assert!(v["intent"]
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t == "emergency"));
}

#[test]
fn test_classify_verbose_lists_matched_keywords() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, _, success) = run_chx(
        &config_path,
        &["--json", "classify", "--verbose", "Newborn in cardiac arrest"],
    );
    assert!(success);
    let v = json(&stdout);
    assert_eq!(v["route"], "pediatric");
    assert!(v["matches"]["emergency"]
        .as_array()
        .unwrap()
        .iter()
        .any(|k| k == "cardiac arrest"));
    assert!(v["matches"]["pediatric"]
        .as_array()
        .unwrap()
        .iter()
        .any(|k| k == "newborn"));
}

#[test]
fn test_classifier_override_from_config() {
    let (_tmp, config_path) = setup_test_env("\n[classifier]\nemergency = [\"code red\"]\n");
    let (stdout, _, success) = run_chx(&config_path, &["--json", "classify", "code red in bay 4"]);
    assert!(success);
    assert_eq!(json(&stdout)["route"], "emergency");
}

#[test]
fn test_corpus_includes_reference_chapters() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_chx(&config_path, &["--json", "corpus"]);
    assert!(success, "corpus failed: {}", stderr);
    let v = json(&stdout);
    assert_eq!(v["embedder_model"], "hashing-bow");
    assert!(v["reference_documents"].as_u64().unwrap() >= 4);
    assert!(v["protocol_documents"].as_u64().unwrap() >= 6);
}

#[test]
fn test_corpus_content_hash_follows_reference_text() {
    let (_tmp, config_path) = setup_test_env("");
    let (first, _, ok) = run_chx(&config_path, &["--json", "corpus"]);
    assert!(ok);
    let (again, _, ok) = run_chx(&config_path, &["--json", "corpus"]);
    assert!(ok);
    let first = json(&first);
    assert_eq!(first["content_hash"], json(&again)["content_hash"]);
    assert_ne!(first["build_id"], json(&again)["build_id"]);

    let reference = config_path.parent().unwrap().join("section01.txt");
    fs::write(&reference, format!("{}\n- Give oxygen to keep saturation above 94%", REFERENCE_TEXT))
        .unwrap();
    let (edited, _, ok) = run_chx(&config_path, &["--json", "corpus"]);
    assert!(ok);
    assert_ne!(first["content_hash"], json(&edited)["content_hash"]);
}

#[test]
fn test_ask_offline_neonatal() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_chx(
        &config_path,
        &["ask", "What is the normal heart rate for a newborn?"],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("120-180"), "got: {}", stdout);
    assert!(!stdout.contains("100-160"));
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        assert!(line.starts_with("• "), "unbulleted line: {:?}", line);
    }
}

#[test]
fn test_ask_empty_query_fails() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, _, success) = run_chx(&config_path, &["ask", "  "]);
    assert!(!success);
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = setup_test_env("\n[retrieval]\ntop_k_general = 0\n");
    let (_, stderr, success) = run_chx(&config_path, &["corpus"]);
    assert!(!success);
    assert!(stderr.contains("top_k_general"), "got: {}", stderr);
}

#[test]
fn test_missing_config_runs_offline() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (stdout, stderr, success) = run_chx(&missing, &["--json", "corpus"]);
    assert!(success, "corpus failed: {}", stderr);
    assert_eq!(json(&stdout)["reference_documents"], 0);
}

#[test]
fn test_sanitize_file() {
    let (tmp, config_path) = setup_test_env("");
    let raw = tmp.path().join("raw.txt");
    fs::write(
        &raw,
        "Here are the key points:\n```\ncode\n```\n1. Keep the airway open\n2. Neonatal heart rate is 100-160 bpm\nA) quiz option",
    )
    .unwrap();
    let (stdout, _, success) = run_chx(&config_path, &["sanitize", raw.to_str().unwrap()]);
    assert!(success);
    assert_eq!(
        stdout.trim_end(),
        "• Keep the airway open\n• Neonatal heart rate is 120-180 bpm"
    );
}

#[test]
fn test_suggest() {
    let (tmp, config_path) = setup_test_env("");
    let history = tmp.path().join("history.json");
    fs::write(
        &history,
        r#"[{"role":"user","content":"How do I give paracetamol?"},{"role":"assistant","content":"• Check the medication dose against weight"}]"#,
    )
    .unwrap();
    let (stdout, _, success) = run_chx(
        &config_path,
        &["--json", "suggest", "--history", history.to_str().unwrap()],
    );
    assert!(success);
    let v = json(&stdout);
    let list = v.as_array().unwrap();
    assert!(!list.is_empty() && list.len() <= 6);
}

/// A completion endpoint that answers every request with HTTP 500.
fn spawn_failing_endpoint() -> (std::net::SocketAddr, std::thread::JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let app = axum::Router::new().route(
                "/v1/chat/completions",
                axum::routing::post(|| async {
                    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "model crashed")
                }),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    (rx.recv().unwrap(), handle)
}

#[test]
fn test_ask_falls_back_when_completion_returns_500() {
    let (addr, _server) = spawn_failing_endpoint();
    let (_tmp, config_path) = setup_test_env(&format!(
        "\n[completion]\nmode = \"local\"\nendpoint = \"http://{}/v1/chat/completions\"\ntimeout_secs = 5\n",
        addr
    ));

    let (stdout, stderr, success) = run_chx(
        &config_path,
        &["--json", "ask", "hand hygiene before patient contact"],
    );
    assert!(success, "ask failed: {}", stderr);
    let v = json(&stdout);
    assert_eq!(v["source"], "extracted");
    let bullets = v["bullets"].as_array().unwrap();
    assert!(!bullets.is_empty());
    assert!(bullets.iter().all(|b| b.as_str().unwrap().starts_with("• ")));
    assert!(v["degraded"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d["code"] == "completion_unavailable"
            && d["message"].as_str().unwrap().contains("500")));
}
