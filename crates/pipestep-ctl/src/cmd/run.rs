//! Whole-spec simulation: every node in execution order, one step call each,
//! threading the environment token and propagated results between calls.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};

use super::graph::fetch_graph;
use super::step::{self, TaskRequest};
use super::vars::convert_file;

#[derive(Default)]
struct RunOptions<'a> {
    vars: Option<&'a str>,
    mocks: HashMap<String, serde_json::Value>,
}

fn parse_options<'a>(args: &[&'a str]) -> Result<RunOptions<'a>> {
    let mut opts = RunOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i] {
            "--vars" => {
                i += 1;
                opts.vars = Some(args.get(i).copied().context("--vars requires a file")?);
            }
            "--mock" => {
                i += 1;
                let spec = args.get(i).copied().context("--mock requires <node>=<json>")?;
                let (node, raw) = spec
                    .split_once('=')
                    .with_context(|| format!("--mock {} is not <node>=<json>", spec))?;
                // Bare words are taken as strings.
                let value = serde_json::from_str(raw)
                    .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
                opts.mocks.insert(node.to_string(), value);
            }
            other => bail!("unexpected argument to run: {}", other),
        }
        i += 1;
    }
    Ok(opts)
}

pub async fn cmd_run(port: u16, spec_path: &str, args: &[&str]) -> Result<()> {
    let opts = parse_options(args)?;
    let graph = fetch_graph(port, spec_path).await?;

    for node in opts.mocks.keys() {
        if !graph.tasks.iter().any(|t| &t.id == node) {
            bail!("--mock names unknown node {}", node);
        }
    }

    let mut environment = match opts.vars {
        Some(path) => Some(convert_file(port, path).await?.environment_token),
        None => None,
    };
    let mut results: HashMap<&str, String> = HashMap::new();
    let mut failures = 0;

    println!("═══════════════════════════════════════");
    println!("  Running {} ({} tasks)", spec_path, graph.tasks.len());
    println!("═══════════════════════════════════════");

    for task in &graph.tasks {
        let prior_inputs = task
            .dependencies
            .iter()
            .filter(|d| d.propagate_result)
            .map(|d| {
                results
                    .get(d.id.as_str())
                    .cloned()
                    .with_context(|| format!("{} ran before its input {}", task.id, d.id))
            })
            .collect::<Result<Vec<_>>>()?;

        let mock = opts.mocks.get(&task.id);
        let resp = step::send(
            port,
            &TaskRequest {
                node_id: &task.id,
                task_type: &task.task_type,
                options: &task.options,
                prior_inputs,
                environment: environment.as_deref(),
                mock_response: mock,
            },
        )
        .await
        .with_context(|| format!("step {} failed", task.id))?;

        let marker = if mock.is_some() { " (mocked)" } else { "" };
        if resp.error.is_empty() {
            println!("  ✓ {:<12} {}{}", task.id, resp.value, marker);
        } else {
            failures += 1;
            println!("  ✗ {:<12} {}", task.id, resp.error);
        }

        results.insert(task.id.as_str(), resp.value_token);
        environment = Some(resp.environment_token);
    }

    println!();
    match failures {
        0 => println!("  All tasks succeeded."),
        n => println!("  {} of {} tasks reported an error.", n, graph.tasks.len()),
    }
    if let Some(token) = environment {
        println!("  environmentToken: {}", token);
    }

    Ok(())
}
