//! Command-line interface
//!
//! One async entry point per subcommand; `main` parses the flags and
//! dispatches here. Session output goes to stdout, operational logging
//! to `tracing`.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::assistant::{AnswerMode, EmergencyAssistant, ModelAttempt};
use crate::diagnostics;
use crate::evaluation;
use crate::generation::{
    chat_prompt, create_generator, GeneratorConfig, SamplingParams, COORDINATOR_SYSTEM_PROMPT,
};
use crate::server;
use crate::training::{
    select_device, CausalLmLora, DatasetConfig, DevicePreference, LoraConfig, TokenizerWrapper,
    Trainer, TrainingConfig, TrainingDataset,
};

/// Prompts used for the post-training smoke test
const TEST_PROMPTS: [&str; 2] = [
    "How do you coordinate evacuation during a wildfire?",
    "What are essential supplies for emergency shelter setup?",
];

/// Scenarios played back by the in-session `test` command
const DEMO_SCENARIOS: [&str; 3] = [
    "Wildfire evacuation needed in 1 hour",
    "Chemical spill near school",
    "Earthquake with building collapse",
];

fn build_assistant(
    model: &str,
    adapter: Option<&str>,
    device: DevicePreference,
    mode: AnswerMode,
    deadline_secs: u64,
) -> EmergencyAssistant {
    let mut config = GeneratorConfig::new(model).with_device(device);
    if let Some(path) = adapter {
        config = config.with_adapter(path);
    }
    EmergencyAssistant::new(config)
        .with_mode(mode)
        .with_deadline(Duration::from_secs(deadline_secs))
}

/// Run the interactive assistance session
pub async fn assist(
    model: String,
    adapter: Option<String>,
    mode: String,
    device: String,
    deadline: u64,
) -> Result<()> {
    let mode: AnswerMode = mode.parse()?;
    let device: DevicePreference = device.parse()?;

    tracing::info!("Starting interactive session");
    tracing::info!("  Model: {}", model);
    if let Some(path) = &adapter {
        tracing::info!("  Adapter: {}", path);
    }
    tracing::info!("  Mode: {:?}", mode);
    tracing::info!("  Device: {}", device);
    tracing::info!("  Deadline: {}s", deadline);

    let assistant = build_assistant(&model, adapter.as_deref(), device, mode, deadline);

    println!("{}", "=".repeat(70));
    println!("EMERGENCY RELIEF AI");
    println!("{}", "=".repeat(70));
    println!("Professional Emergency Response System");
    println!("Instant responses | Expert protocols | Optional AI enrichment");

    if mode != AnswerMode::TemplateOnly {
        assistant.warm_up();
        println!("\nModel loading in the background; template answers are available now.");
    }

    println!("\nEMERGENCY RELIEF AI READY");
    println!("Describe any emergency situation for immediate professional guidance.");
    println!("Commands: 'help' for examples | 'test' for demo | 'quit' to exit");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("\nEmergency Situation: ");
        io::stdout().flush().context("Failed to flush stdout")?;

        line.clear();
        let read = stdin.read_line(&mut line).context("Failed to read input")?;
        if read == 0 {
            // EOF, e.g. piped input exhausted
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "quit" | "exit" | "q" => break,
            "help" => {
                show_help();
                continue;
            }
            "test" => {
                run_demo(&assistant);
                continue;
            }
            _ => {}
        }

        let guidance = assistant.respond(input);
        println!("\n{}", "=".repeat(70));
        println!("EMERGENCY RESPONSE GUIDANCE");
        println!("{}", "=".repeat(70));
        println!("{}", guidance.text);
        println!("{}", "=".repeat(70));
        println!(
            "Response time: {:.2}s | Source: {}",
            guidance.elapsed.as_secs_f64(),
            guidance.source
        );
    }

    println!("\nEmergency Relief AI session ended.");
    println!("Stay safe and be prepared!");
    Ok(())
}

fn show_help() {
    let examples = [
        "Wildfire approaching town in 2 hours, 500 residents need evacuation",
        "Flash flood has trapped 50 people in school building",
        "6.2 earthquake damaged buildings, multiple people trapped in rubble",
        "Chemical truck overturned on highway near elementary school",
        "Bus accident with 25 injured people, local hospital overwhelmed",
        "Category 3 hurricane approaching coastal town in 24 hours",
        "Mass shooting incident at shopping mall with multiple casualties",
        "Building collapse during construction, 15 workers potentially trapped",
    ];

    println!("\n{}", "=".repeat(70));
    println!("EMERGENCY SCENARIO EXAMPLES");
    println!("{}", "=".repeat(70));
    println!("Try any of these scenarios or describe your own emergency:");
    for (i, example) in examples.iter().enumerate() {
        println!("{:2}. {}", i + 1, example);
    }
    println!("\nTIP: Include details like timeframes, number of people, and location");
    println!("{}", "=".repeat(70));
}

fn run_demo(assistant: &EmergencyAssistant) {
    println!("\n{}", "=".repeat(70));
    println!("EMERGENCY AI DEMONSTRATION");
    println!("{}", "=".repeat(70));

    for (i, scenario) in DEMO_SCENARIOS.iter().enumerate() {
        println!("\nDemo {}: {}", i + 1, scenario);
        println!("{}", "-".repeat(50));
        let guidance = assistant.respond(scenario);
        for line in guidance.text.lines().take(8) {
            println!("{}", line);
        }
        println!("   ... (full protocol available in real use)");
    }

    println!("\nDemo complete! Try your own emergency scenarios.");
    println!("{}", "=".repeat(70));
}

/// Generate one response and exit. Unlike the interactive session this
/// requires a working model; there is no template fallback.
pub async fn generate(
    prompt: String,
    model: String,
    adapter: Option<String>,
    device: String,
    max_tokens: usize,
    deadline: u64,
) -> Result<()> {
    let device: DevicePreference = device.parse()?;
    if prompt.trim().is_empty() {
        anyhow::bail!("Prompt must not be empty");
    }

    tracing::info!("One-shot generation");
    tracing::info!("  Model: {}", model);
    if let Some(path) = &adapter {
        tracing::info!("  Adapter: {}", path);
    }
    tracing::info!("  Max tokens: {}", max_tokens);
    tracing::info!("  Deadline: {}s", deadline);

    let assistant = build_assistant(
        &model,
        adapter.as_deref(),
        device,
        AnswerMode::ModelFirst,
        deadline,
    );

    println!("Loading model (this may take a few minutes on CPU)...");
    assistant
        .ensure_model()
        .with_context(|| format!("Failed to load model: {}", model))?;

    let start = Instant::now();
    let params = SamplingParams::service().with_max_new_tokens(max_tokens);
    match assistant.try_model(&prompt, params) {
        ModelAttempt::Completed(text) | ModelAttempt::TooShort(text) => {
            println!("\n{}", text);
            println!("\n[Generated in {:.1}s]", start.elapsed().as_secs_f64());
            Ok(())
        }
        ModelAttempt::TimedOut => {
            anyhow::bail!("Generation missed the {}s deadline", deadline)
        }
        ModelAttempt::Saturated => anyhow::bail!("All generation slots are busy"),
        ModelAttempt::Errored(reason) => anyhow::bail!("Generation failed: {}", reason),
        ModelAttempt::NotLoaded { .. } => anyhow::bail!("Model is not loaded"),
    }
}

/// Run the guidance HTTP API
pub async fn serve(
    host: String,
    port: u16,
    model: String,
    adapter: Option<String>,
    device: String,
    deadline: u64,
    preload: bool,
) -> Result<()> {
    let device: DevicePreference = device.parse()?;

    tracing::info!("Starting guidance API");
    tracing::info!("  Address: {}:{}", host, port);
    tracing::info!("  Model: {}", model);
    if let Some(path) = &adapter {
        tracing::info!("  Adapter: {}", path);
    }

    let assistant = Arc::new(build_assistant(
        &model,
        adapter.as_deref(),
        device,
        AnswerMode::ModelFirst,
        deadline,
    ));

    if preload {
        println!("Loading model before accepting requests...");
        assistant
            .ensure_model()
            .with_context(|| format!("Failed to load model: {}", model))?;
        println!("Model loaded successfully!");
    } else {
        assistant.warm_up();
    }

    println!("Starting server on http://{}:{}", host, port);
    println!("Available endpoints:");
    println!("  GET  http://{}:{}/health", host, port);
    println!("  POST http://{}:{}/emergency-guidance", host, port);
    println!("  GET  http://{}:{}/test", host, port);

    server::serve_api(assistant, &host, port).await
}

/// Run the browser demo
pub async fn demo(
    host: String,
    port: u16,
    model: String,
    adapter: Option<String>,
    device: String,
    deadline: u64,
) -> Result<()> {
    let device: DevicePreference = device.parse()?;

    tracing::info!("Starting web demo");
    tracing::info!("  Address: {}:{}", host, port);
    tracing::info!("  Model: {}", model);
    if let Some(path) = &adapter {
        tracing::info!("  Adapter: {}", path);
    }

    let assistant = Arc::new(build_assistant(
        &model,
        adapter.as_deref(),
        device,
        AnswerMode::ModelFirst,
        deadline,
    ));

    println!("Emergency Relief AI web demo");
    println!("Open http://{}:{} in a browser", host, port);
    println!("The model loads in the background; the page shows its status.");

    server::serve_demo(assistant, &host, port).await
}

fn run_stage<T>(name: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
    println!("\n{}...", name);
    let start = Instant::now();
    match work() {
        Ok(value) => {
            println!("{} completed ({:.1}s)", name, start.elapsed().as_secs_f64());
            Ok(value)
        }
        Err(err) => {
            println!("{} failed", name);
            Err(err.context(format!("{} failed", name)))
        }
    }
}

/// Fine-tune the LoRA adapter described by a training config file
pub async fn train(config_path: String, device: String) -> Result<()> {
    let device_pref: DevicePreference = device.parse()?;

    tracing::info!("Starting training");
    tracing::info!("  Config: {}", config_path);
    tracing::info!("  Device: {}", device_pref);

    let config = TrainingConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load training config: {}", config_path))?;

    println!("{}", "=".repeat(60));
    println!("EMERGENCY RELIEF AI TRAINING");
    println!("{}", "=".repeat(60));
    println!("Model: {}", config.model_path);
    println!("Data: {}", config.data_path);
    println!("Output: {}", config.output_dir);

    let overall_start = Instant::now();
    let device = select_device(device_pref)?;
    let lora_config = LoraConfig::default();

    let (mut trainer, tokenizer, model) = run_stage("Loading Model and Tokenizer", || {
        let trainer = Trainer::new(config.clone(), device.clone())?;
        let tokenizer = TokenizerWrapper::from_pretrained(&config.model_path)?
            .with_max_length(config.max_length);
        let model = CausalLmLora::from_pretrained(
            &config.model_path,
            &lora_config,
            trainer.var_map(),
            trainer.device(),
        )?;
        Ok((trainer, tokenizer, model))
    })?;

    run_stage("Setting up LoRA", || {
        println!("{}", model.stats());
        Ok(())
    })?;

    let (train_dataset, eval_dataset) = run_stage("Preparing Dataset", || {
        let dataset = TrainingDataset::load(&config.data_path, DatasetConfig::default())?;
        println!("{}", dataset.stats());

        let (train_examples, eval_examples) = dataset.split(0.9);
        println!(
            "Split: {} training, {} validation examples",
            train_examples.len(),
            eval_examples.len()
        );

        let no_shuffle = DatasetConfig {
            shuffle: false,
            seed: None,
        };
        let train = TrainingDataset::new(train_examples, DatasetConfig::default());
        let eval =
            (!eval_examples.is_empty()).then(|| TrainingDataset::new(eval_examples, no_shuffle));
        Ok((train, eval))
    })?;

    run_stage("Setting up Trainer", || {
        println!(
            "Epochs: {} | Batch size: {} | Grad accumulation: {}",
            config.num_epochs, config.batch_size, config.gradient_accumulation_steps
        );
        println!(
            "Learning rate: {:.0e} | Warmup steps: {}",
            config.learning_rate, config.warmup_steps
        );
        Ok(())
    })?;

    let result = run_stage("Training Model", || {
        trainer.train(&model, &tokenizer, &train_dataset, eval_dataset.as_ref())
    })?;

    // Free the training copy of the weights before the test load
    drop(model);
    drop(trainer);

    let adapter_path = result.adapter_path.clone();
    run_stage("Testing Model", || {
        let adapter = adapter_path
            .as_deref()
            .context("No adapter was saved; nothing to test")?;

        let generator = create_generator(
            GeneratorConfig::new(&config.model_path)
                .with_adapter(adapter)
                .with_device(device_pref),
        )?;
        let params = SamplingParams::default().with_max_new_tokens(100);

        for prompt in TEST_PROMPTS {
            println!("\nPrompt: {}", prompt);
            let formatted = chat_prompt(COORDINATOR_SYSTEM_PROMPT, prompt);
            let response = generator.generate(&formatted, &params)?;
            let preview: String = response.chars().take(150).collect();
            println!("Response: {}...", preview);
        }
        Ok(())
    })?;

    println!("\n{}", "=".repeat(60));
    println!("EMERGENCY RELIEF AI TRAINING COMPLETED!");
    println!("{}", "=".repeat(60));
    println!("Total time: {:.1}s", overall_start.elapsed().as_secs_f64());
    println!("Final metrics: {}", result.metrics);
    if let Some(path) = &result.adapter_path {
        println!("Adapter saved to: {}", path);
        println!("\nNext steps:");
        println!("  era eval --model {} --adapter {}", config.model_path, path);
        println!("  era serve --model {} --adapter {}", config.model_path, path);
    }

    Ok(())
}

/// Score the model against the built-in emergency scenarios
pub async fn eval(
    model: String,
    adapter: Option<String>,
    device: String,
    output: Option<String>,
    deadline: u64,
) -> Result<()> {
    let device: DevicePreference = device.parse()?;

    tracing::info!("Starting scenario evaluation");
    tracing::info!("  Model: {}", model);
    if let Some(path) = &adapter {
        tracing::info!("  Adapter: {}", path);
    }
    if let Some(path) = &output {
        tracing::info!("  Output: {}", path);
    }

    println!("EMERGENCY RELIEF AI - SCENARIO EVALUATION");
    println!("{}", "=".repeat(50));
    println!("Model: {}", model);
    if let Some(path) = &adapter {
        println!("Adapter: {}", path);
    }

    let assistant = build_assistant(
        &model,
        adapter.as_deref(),
        device,
        AnswerMode::ModelFirst,
        deadline,
    );

    println!("\nLoading model (this may take a few minutes on CPU)...");
    assistant
        .ensure_model()
        .with_context(|| format!("Failed to load model: {}", model))?;
    println!("Model loaded.");

    let results = evaluation::run_scenarios(&assistant);
    evaluation::print_summary(&results);

    if let Some(path) = output {
        evaluation::export_csv(&results, &path)?;
        println!("\nResults exported to: {}", path);
    }

    Ok(())
}

/// Validate the training environment without touching the model weights
pub async fn doctor(config: String) -> Result<()> {
    tracing::info!("Validating setup");
    tracing::info!("  Config: {}", config);

    if !diagnostics::validate_setup(&config) {
        anyhow::bail!("Setup validation failed");
    }
    Ok(())
}

/// Run the staged model smoke test
pub async fn diagnose(model: String, adapter: Option<String>, device: String) -> Result<()> {
    let device: DevicePreference = device.parse()?;

    tracing::info!("Running model diagnostic");
    tracing::info!("  Model: {}", model);
    if let Some(path) = &adapter {
        tracing::info!("  Adapter: {}", path);
    }

    if !diagnostics::diagnose_model(&model, adapter.as_deref(), device) {
        anyhow::bail!("Model diagnostic failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_assistant(mode: AnswerMode) -> EmergencyAssistant {
        // An absolute path that does not exist keeps every load local and failing fast
        build_assistant("/nonexistent/model", None, DevicePreference::Cpu, mode, 1)
    }

    #[test]
    fn test_build_assistant_wires_mode() {
        let assistant = offline_assistant(AnswerMode::ModelFirst);
        assert_eq!(assistant.mode(), AnswerMode::ModelFirst);
    }

    #[test]
    fn test_demo_answers_without_model() {
        let assistant = offline_assistant(AnswerMode::TemplateOnly);
        for scenario in DEMO_SCENARIOS {
            let guidance = assistant.respond(scenario);
            assert!(!guidance.text.is_empty());
        }
    }

    #[test]
    fn test_demo_scenarios_hit_distinct_categories() {
        let assistant = offline_assistant(AnswerMode::TemplateOnly);
        let categories: std::collections::HashSet<_> = DEMO_SCENARIOS
            .iter()
            .map(|s| assistant.respond(s).category)
            .collect();
        assert_eq!(categories.len(), DEMO_SCENARIOS.len());
    }
}
