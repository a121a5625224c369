//! Calculator with tools example
//!
//! Demonstrates registering tools with the shared [`coda_core::ToolManager`]
//! and letting the orchestrator detect, approve, and dispatch calls to them
//! automatically instead of handling tool-use blocks by hand.

use coda_core::{
    tool, AgentOptions, AlwaysApprove, ApprovalEngine, Orchestrator, OrchestratorConfig,
    PromptContext, Provider, Session, ToolManager, TurnEvent,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tools = ToolManager::new();

    tools
        .register(
            tool("add", "Add two numbers")
                .param("a", "number")
                .param("b", "number")
                .build(|args| async move {
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    Ok(json!({"result": a + b}))
                }),
        )
        .await?;

    tools
        .register(
            tool("subtract", "Subtract two numbers")
                .param("a", "number")
                .param("b", "number")
                .build(|args| async move {
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    Ok(json!({"result": a - b}))
                }),
        )
        .await?;

    tools
        .register(
            tool("multiply", "Multiply two numbers")
                .param("a", "number")
                .param("b", "number")
                .build(|args| async move {
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    Ok(json!({"result": a * b}))
                }),
        )
        .await?;

    tools
        .register(
            tool("divide", "Divide two numbers")
                .param("a", "number")
                .param("b", "number")
                .build(|args| async move {
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    if b == 0.0 {
                        return Ok(json!({"error": "Cannot divide by zero"}));
                    }
                    Ok(json!({"result": a / b}))
                }),
        )
        .await?;

    let options = AgentOptions::builder()
        .system_prompt(
            "You are a helpful calculator assistant. \
             Use the provided tools to perform calculations. \
             Always show your work and explain the result.",
        )
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .temperature(0.1)
        .build()?;

    let provider = Provider::new(options.provider().clone())?;
    let approval = ApprovalEngine::new(options.approval_mode(), Box::new(AlwaysApprove));

    let orchestrator = Orchestrator::new(
        provider,
        tools,
        approval,
        OrchestratorConfig::default(),
        PromptContext {
            base_instructions: options.system_prompt().to_string(),
            ..Default::default()
        },
    );

    let queries = [
        "What is 25 plus 17?",
        "Calculate 144 divided by 12",
        "What's 7 times 8, then add 5?",
    ];

    println!("{}", "=".repeat(70));
    println!("CALCULATOR TOOLS EXAMPLE");
    println!("{}", "=".repeat(70));
    println!();

    for query in queries {
        println!("User: {query}");
        println!("{}", "-".repeat(50));

        let mut session = Session::new(options.provider().model_field());

        orchestrator
            .run_turn(
                &mut session,
                std::env::current_dir()?,
                query,
                Default::default(),
                |event| match event {
                    TurnEvent::Display(text) => {
                        if !text.trim().is_empty() {
                            print!("{text}");
                        }
                    }
                    TurnEvent::ToolCallDetected { name, .. } => {
                        println!("\n  tool call: {name}");
                    }
                    TurnEvent::ToolResult { name, is_error } => {
                        println!("  {name} -> {}", if is_error { "error" } else { "ok" });
                    }
                    _ => {}
                },
            )
            .await?;

        println!();
    }

    println!("{}", "=".repeat(70));
    println!("Example complete!");

    Ok(())
}
