#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use label_selector::Selector;
use serde_json::Value;
use std::{io::Read, path::PathBuf, process::ExitCode};
use tracing::{debug, info};

/// Evaluate Kubernetes label selectors
///
/// Selectors are given as YAML or JSON literals, either in the structured
/// `matchLabels`/`matchExpressions` form or as a flat mapping of labels, or in
/// label-query syntax with `--query`. Prefix an argument with `@` to read it
/// from a file.
#[derive(Debug, Parser)]
#[clap(name = "label-select", version, about)]
struct Args {
    #[clap(long, env = "LABEL_SELECT_LOG", default_value = "warn")]
    log_level: kubert::LogFilter,

    #[clap(long, env = "LABEL_SELECT_LOG_FORMAT", default_value = "plain")]
    log_format: kubert::LogFormat,

    /// Read selectors in label-query syntax (e.g. `app=web,!legacy`)
    #[clap(long, global = true)]
    query: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resources matched by a selector, one per line
    Match {
        #[clap(long, short = 's')]
        selector: String,

        /// Match every resource when the selector has no requirements
        #[clap(long)]
        empty_selects_all: bool,

        /// A YAML or JSON array, mapping, or List of resources (default: stdin)
        file: Option<PathBuf>,
    },

    /// Exit successfully if BROAD matches everything NARROW matches
    Covers { broad: String, narrow: String },

    /// Print a selector in normalized form
    Export {
        selector: String,

        #[clap(long, short = 'o', value_enum, default_value = "json")]
        output: Output,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Output {
    Json,
    Yaml,
    Query,
}

fn main() -> Result<ExitCode> {
    let Args {
        log_level,
        log_format,
        query,
        command,
    } = Args::parse();

    log_format
        .try_init(log_level)
        .expect("must configure logging");

    match command {
        Command::Match {
            selector,
            empty_selects_all,
            file,
        } => {
            let selector = load_selector(&selector, query, empty_selects_all)?;
            let resources = read_resources(file)?;
            let names = selected_names(&selector, &resources);
            info!(selected = names.len(), "Selected resources");
            for name in names {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Covers { broad, narrow } => {
            let broad = load_selector(&broad, query, false)?;
            let narrow = load_selector(&narrow, query, false)?;
            let covers = broad.covers(&narrow);
            println!("{}", covers);
            Ok(if covers {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Export { selector, output } => {
            let selector = load_selector(&selector, query, false)?;
            match output {
                Output::Json => println!("{}", selector.export_json()?),
                Output::Yaml => print!("{}", serde_yaml::to_string(&selector)?),
                Output::Query => println!("{}", selector.to_query()?),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_selector(arg: &str, query: bool, empty_selects_all: bool) -> Result<Selector> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read selector from {}", path))?,
        None => arg.to_string(),
    };

    let selector = if query {
        text.parse::<Selector>()
            .with_context(|| format!("invalid label query: {:?}", text.trim()))?
            .with_empty_selects_all(empty_selects_all)
    } else {
        Selector::from_yaml(&text, empty_selects_all)?
    };
    debug!(%selector, "Loaded selector");
    Ok(selector)
}

fn read_resources(file: Option<PathBuf>) -> Result<Value> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            text
        }
    };
    serde_yaml::from_str(&text).context("resources must be YAML or JSON")
}

/// Names the resources a selector matches: `namespace/name` for sequences and
/// Lists, keys for mappings.
///
/// Unnamed resources are named by their position in the input document.
fn selected_names(selector: &Selector, resources: &Value) -> Vec<String> {
    let items = match resources {
        Value::Array(items) => items,
        Value::Object(list) => match list.get("items") {
            Some(Value::Array(items)) => items,
            _ => {
                return list
                    .iter()
                    .filter(|(_, r)| selector.matches(*r))
                    .map(|(k, _)| k.clone())
                    .collect()
            }
        },
        _ => return vec![],
    };
    items
        .iter()
        .enumerate()
        .filter(|(_, r)| selector.matches(*r))
        .map(resource_name)
        .collect()
}

fn resource_name((i, resource): (usize, &Value)) -> String {
    let name = resource.pointer("/metadata/name").and_then(Value::as_str);
    let ns = resource
        .pointer("/metadata/namespace")
        .and_then(Value::as_str);
    match (ns, name) {
        (Some(ns), Some(name)) => format!("{}/{}", ns, name),
        (None, Some(name)) => name.to_string(),
        (_, None) => format!("[{}]", i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loads_literals_and_queries() {
        let literal = load_selector("{matchLabels: {app: web}}", false, false).unwrap();
        let query = load_selector("app=web", true, false).unwrap();
        assert_eq!(literal, query);

        let flat = load_selector("app: web\nlegacy:", false, false).unwrap();
        assert_eq!(flat.to_string(), "app=web,legacy");

        assert!(load_selector("app in (web", true, false).is_err());
        assert!(load_selector("{matchExpressions: [{key: a, operator: Gt}]}", false, false).is_err());
    }

    #[test]
    fn names_selected_resources() {
        let all = Selector::new(true);
        let pods = json!([
            { "metadata": { "name": "web-0", "namespace": "prod" } },
            { "metadata": { "name": "web-1" } },
            { "metadata": {} },
        ]);
        assert_eq!(
            selected_names(&all, &pods),
            vec!["prod/web-0", "web-1", "[2]"]
        );

        let list = json!({ "kind": "List", "items": [{ "metadata": { "name": "a" } }] });
        assert_eq!(selected_names(&all, &list), vec!["a"]);

        let mapping = json!({ "x": {}, "y": {} });
        assert_eq!(selected_names(&all, &mapping), vec!["x", "y"]);

        assert!(selected_names(&all, &Value::Null).is_empty());
    }

    #[test]
    fn unnamed_resources_keep_their_input_position() {
        let resources = json!([
            { "metadata": { "labels": { "app": "db" } } },
            { "metadata": { "labels": { "app": "web" } } },
        ]);
        let selector = load_selector("app=web", true, false).unwrap();
        assert_eq!(selected_names(&selector, &resources), vec!["[1]"]);

        let mapping = json!({
            "x": { "metadata": { "labels": { "app": "db" } } },
            "y": { "metadata": { "labels": { "app": "web" } } },
        });
        assert_eq!(selected_names(&selector, &mapping), vec!["y"]);
    }

    #[test]
    fn query_output_requires_expressible_selectors() {
        let selector = load_selector(r#"{"app": "x,y"}"#, false, false).unwrap();
        assert!(selector.to_query().is_err());

        let selector = load_selector("{app: web, legacy: null}", false, false).unwrap();
        assert_eq!(selector.to_query().unwrap(), "app=web,legacy");
    }

    #[test]
    fn selects_from_documents() {
        let resources: Value = serde_yaml::from_str(
            r#"
kind: List
items:
  - metadata: {name: web-0, labels: {app: web}}
  - metadata: {name: db-0, labels: {app: db}}
  - metadata: {name: web-1, labels: {app: web, canary: ""}}
"#,
        )
        .unwrap();
        let selector = load_selector("app=web,!canary", true, false).unwrap();
        assert_eq!(selected_names(&selector, &resources), vec!["web-0"]);
    }
}
