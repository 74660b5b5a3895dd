//! CLI command implementations.
//!
//! Human-readable output goes to stdout; `--json` switches to one JSON
//! document per command. Logs go to stderr.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;

use clinical_harness_core::classify::KeywordTable;
use clinical_harness_core::fluids::{calculate, format_requirement};
use clinical_harness_core::models::ConversationTurn;
use clinical_harness_core::sanitize::{run as sanitize, SanitizeMode};
use clinical_harness_core::suggest::suggest_follow_ups;

use crate::config::Config;
use crate::engine;

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read a JSON array of `{ "role": "user" | "assistant", "content": ... }`.
pub fn read_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid history file: {}", path.display()))
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read input file: {}", p.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

pub fn run_ask(config: &Config, query: &str, history: Option<&Path>, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let history = match history {
        Some(p) => read_history(p)?,
        None => Vec::new(),
    };

    let pipeline = engine::build_pipeline(config)?;
    let answer = pipeline.answer(query, &history);

    if json {
        return print_json(&answer);
    }

    for bullet in &answer.bullets {
        println!("{}", bullet);
    }
    if !answer.degraded.is_empty() {
        eprintln!();
        for note in &answer.degraded {
            eprintln!("[{}] {}", note.code(), note);
        }
    }
    Ok(())
}

pub fn run_calc(weight_kg: f64, json: bool) -> Result<()> {
    if !(weight_kg.is_finite() && weight_kg > 0.0) {
        bail!("weight must be a positive number of kg");
    }
    let requirement = calculate(weight_kg);
    if json {
        return print_json(&requirement);
    }
    for bullet in format_requirement(&requirement) {
        println!("{}", bullet);
    }
    Ok(())
}

/// Keywords of each rule that occur in `query`, in table order. Rules
/// with no hit are left out.
fn matched_keywords<'a>(keywords: &'a KeywordTable, query: &str) -> Vec<(&'static str, Vec<&'a str>)> {
    let lower = query.to_lowercase();
    keywords
        .rules()
        .iter()
        .map(|rule| {
            let hits: Vec<&str> = rule
                .keywords
                .iter()
                .map(String::as_str)
                .filter(|k| lower.contains(k))
                .collect();
            (rule.tag.as_str(), hits)
        })
        .filter(|(_, hits)| !hits.is_empty())
        .collect()
}

pub fn run_classify(keywords: &KeywordTable, query: &str, verbose: bool, json: bool) -> Result<()> {
    let c = keywords.classify(query);
    let matches = if verbose {
        matched_keywords(keywords, query)
    } else {
        Vec::new()
    };

    if json {
        let mut value = serde_json::to_value(&c)?;
        if verbose {
            let by_tag: serde_json::Map<String, serde_json::Value> = matches
                .iter()
                .map(|(tag, hits)| (tag.to_string(), serde_json::json!(hits)))
                .collect();
            value["matches"] = serde_json::Value::Object(by_tag);
        }
        return print_json(&value);
    }

    let tags: Vec<&str> = c.intent.tags().map(|t| t.as_str()).collect();
    println!("route:     {}", c.route.as_str());
    println!("follow-up: {}", c.is_follow_up);
    println!("tags:      {}", if tags.is_empty() { "-".to_string() } else { tags.join(", ") });
    for (tag, hits) in &matches {
        println!("  {:<16} {}", tag, hits.join(", "));
    }
    Ok(())
}

pub fn run_search(config: &Config, query: &str, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let pipeline = engine::build_pipeline(config)?;
    let outcome = pipeline.retrieve(query);

    if let Some(e) = &outcome.error {
        bail!("{}", e);
    }
    if json {
        return print_json(&outcome.documents);
    }

    for q in &outcome.queries {
        println!("search: {}", q);
    }
    if outcome.documents.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!();
    for (i, d) in outcome.documents.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            d.score,
            d.document.title,
            d.document.id
        );
    }
    Ok(())
}

pub fn run_sanitize(path: Option<&Path>, extract: bool, json: bool) -> Result<()> {
    let raw = read_input(path)?;
    let mode = if extract {
        SanitizeMode::Extraction
    } else {
        SanitizeMode::Completion
    };
    let out = sanitize(&raw, mode);
    if json {
        return print_json(&serde_json::json!({
            "bullets": out.bullets,
            "corrections": out.corrections,
            "guard": out.guard,
            "not_available": out.not_available,
        }));
    }
    println!("{}", out.text());
    Ok(())
}

pub fn run_suggest(history: &Path, json: bool) -> Result<()> {
    let history = read_history(history)?;
    let suggestions = suggest_follow_ups(&history);
    if json {
        return print_json(&suggestions);
    }
    for s in suggestions {
        println!("{}", s);
    }
    Ok(())
}

pub fn run_corpus(config: &Config, json: bool) -> Result<()> {
    let pipeline = engine::build_pipeline(config)?;
    let stats = pipeline.knowledge().snapshot().stats();
    if json {
        return print_json(&stats);
    }

    println!("snapshot:  v{} ({})", stats.version, stats.build_id);
    println!("built at:  {}", stats.built_at);
    println!("embedder:  {}", stats.embedder_model);
    println!("content:   {}", stats.content_hash);
    println!(
        "documents: {} ({} reference, {} protocol)",
        stats.documents, stats.reference_documents, stats.protocol_documents
    );
    for (name, count) in &stats.categories {
        println!("  {:<32} {}", name, count);
    }
    Ok(())
}
