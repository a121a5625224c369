//! Simple query example
//!
//! Demonstrates running a single turn end to end: provider, empty tool
//! registry, always-approve engine, and the orchestrator's streamed events.

use coda_core::{
    AgentOptions, AlwaysApprove, ApprovalEngine, Orchestrator, OrchestratorConfig, PromptContext,
    Provider, Session, ToolManager, TurnEvent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = AgentOptions::builder()
        .system_prompt("You are a helpful assistant")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .temperature(0.7)
        .max_tokens(500)
        .build()?;

    let provider = Provider::new(options.provider().clone())?;
    let tools = ToolManager::new();
    let approval = ApprovalEngine::new(options.approval_mode(), Box::new(AlwaysApprove));
    let mut session = Session::new(options.provider().model_field());

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

    println!("Sending query to model...\n");
    print!("Response: ");

    orchestrator
        .run_turn(
            &mut session,
            std::env::current_dir()?,
            "What's the capital of France? Please be brief.",
            Default::default(),
            |event| match event {
                TurnEvent::Display(text) => {
                    print!("{text}");
                    let _ = std::io::Write::flush(&mut std::io::stdout());
                }
                TurnEvent::ToolCallDetected { name, .. } => {
                    println!("\nTool called: {name}");
                }
                TurnEvent::EndOfTurn { reason } => {
                    println!("\n\n[turn ended: {reason}]");
                }
                _ => {}
            },
        )
        .await?;

    Ok(())
}
