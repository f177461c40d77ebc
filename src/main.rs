use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use capture_workflow::guidance::{next_state, GuidanceInput, GuidanceState};
use capture_workflow::workflow::{
    CaptureEngine, CaptureState, CaptureWorkflow, FeedbackCode, FeedbackSet,
    FileSystemFolderManager, LifecyclePhase, PhaseSnapshot, SimulatedCaptureEngine,
    SimulatedEngineFactory, SimulatedReconstructionFactory, WorkflowDependencies,
    WorkflowSettings,
};
use capture_workflow::{init_telemetry, CaptureWorkflowConfig};

const MAX_SCAN_PASSES: usize = 4;
const MAX_GUIDANCE_STEPS: usize = 8;
const PHASE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "capture-workflow")]
#[command(about = "Object capture workflow orchestration core")]
#[command(long_about = "Drives the object capture lifecycle, guidance dialogue and feedback \
                       messages against simulated engines. Use 'simulate' for a scripted session \
                       and 'guidance' to walk the guidance table.")]
struct Cli {
    /// Emit JSON log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted capture session and print every lifecycle transition
    Simulate {
        /// Directory receiving the scan folders (defaults to the configured scans root)
        #[arg(long)]
        scans_root: Option<PathBuf>,
        /// Images captured on each scan pass
        #[arg(long, default_value = "20")]
        images: usize,
        /// Scan passes to run before finishing
        #[arg(long, default_value = "2")]
        passes: usize,
        /// Treat the object as flippable when answering guidance screens
        #[arg(long)]
        flippable: bool,
        /// Cancel the first capture attempt before running the script
        #[arg(long)]
        cancel_first: bool,
    },
    /// Walk the guidance table from a state
    Guidance {
        /// Starting guidance state, e.g. first-segment-complete
        #[arg(long)]
        from: GuidanceState,
        /// Inputs to apply in order, e.g. continue:true finish
        inputs: Vec<GuidanceInput>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    CaptureWorkflowConfig::load_env_file()?;
    let mut config = CaptureWorkflowConfig::load().context("Failed to load configuration")?;
    if cli.json {
        config.observability.json_logs = true;
    }
    init_telemetry(&config.observability)?;

    match cli.command {
        Commands::Simulate {
            scans_root,
            images,
            passes,
            flippable,
            cancel_first,
        } => {
            if let Some(root) = scans_root {
                config.capture.scans_root = root;
            }
            let script = Script {
                images,
                passes: passes.clamp(1, MAX_SCAN_PASSES),
                flippable,
                cancel_first,
            };
            tokio::runtime::Runtime::new()?.block_on(async {
                simulate_command(&config, script).await
            })
        }
        Commands::Guidance { from, inputs } => guidance_command(from, &inputs),
    }
}

struct Script {
    images: usize,
    passes: usize,
    flippable: bool,
    cancel_first: bool,
}

async fn simulate_command(config: &CaptureWorkflowConfig, script: Script) -> Result<()> {
    let engines = Arc::new(SimulatedEngineFactory::new());
    let reconstructions = Arc::new(SimulatedReconstructionFactory::new());
    let dependencies = WorkflowDependencies {
        folders: Arc::new(FileSystemFolderManager::new(&config.capture.scans_root)),
        capture_engines: engines.clone(),
        reconstruction_engines: reconstructions,
    };
    let workflow = CaptureWorkflow::new(dependencies, WorkflowSettings::from(config));
    let mut transitions = workflow.transitions();

    println!("📷 Simulating capture into {}", config.capture.scans_root.display());
    workflow.begin_capture().await?;
    wait_for_phase(&workflow, LifecyclePhase::Capturing).await?;

    if script.cancel_first {
        workflow.cancel_capture().await?;
        wait_for(&workflow, |snapshot| {
            snapshot.phase() == LifecyclePhase::Capturing && engines.created().len() > 1
        })
        .await?;
        println!("↩️  First attempt cancelled, capture restarted");
    }

    let mut reconstructing = false;
    for pass in 1..=script.passes {
        let engine = latest_engine(&engines)?;
        run_scan_pass(&workflow, &engine, script.images).await;

        let mut machine = workflow.begin_guidance().await?;
        println!("🧭 Pass {pass}: guidance starts at {}", machine.current_state());

        for _ in 0..MAX_GUIDANCE_STEPS {
            if machine.is_finished() {
                break;
            }
            let accepted = machine.current_state_inputs();
            let input = choose_input(&accepted, pass >= script.passes, script.flippable)
                .ok_or_else(|| anyhow!("no scripted input for {}", machine.current_state()))?;
            if !machine.enter(input) {
                bail!("guidance rejected {input} in {}", machine.current_state());
            }
            println!("   {input} -> {}", machine.current_state());
        }

        let outcome = machine.current_state();
        workflow.apply_guidance(outcome).await?;
        println!(
            "   orbit {} flipped={} ({})",
            workflow.orbit().await,
            workflow.is_object_flipped().await,
            workflow.orbit_guidance_text(script.flippable).await
        );

        if outcome == GuidanceState::Reconstruction {
            reconstructing = true;
            break;
        }
    }

    if !reconstructing {
        let engine = latest_engine(&engines)?;
        engine.finish();
    }

    wait_for_phase(&workflow, LifecyclePhase::Reconstructing).await?;
    workflow.reconstruction_finished().await?;
    workflow.finish_viewing().await?;
    wait_for_phase(&workflow, LifecyclePhase::Capturing).await?;

    println!();
    println!("🔁 Lifecycle transitions:");
    print_transitions(&mut transitions);

    if let Some(folder) = workflow.scan_folder().await {
        println!();
        println!("📁 Next capture folder: {}", folder.root.display());
    }
    Ok(())
}

async fn run_scan_pass(workflow: &CaptureWorkflow, engine: &SimulatedCaptureEngine, images: usize) {
    engine.emit_state(CaptureState::Detecting);
    engine.emit_state(CaptureState::Capturing);

    let feedback: FeedbackSet = [FeedbackCode::MovingTooFast, FeedbackCode::ObjectTooFar]
        .into_iter()
        .collect();
    engine.emit_feedback(feedback);
    engine.capture_images(images);
    engine.emit_feedback(FeedbackSet::new());
    engine.complete_scan_pass();

    // Let the coordinator drain the engine's streams.
    tokio::time::sleep(Duration::from_millis(20)).await;
    if let Some(text) = workflow.messages().active_text() {
        println!("💬 {text}");
    }
}

/// Finish once allowed on the last pass, otherwise keep going.
fn choose_input(
    accepted: &[GuidanceInput],
    last_pass: bool,
    flippable: bool,
) -> Option<GuidanceInput> {
    let preferred = if last_pass && accepted.contains(&GuidanceInput::Finish) {
        GuidanceInput::Finish
    } else {
        GuidanceInput::Continue {
            is_flippable: flippable,
        }
    };

    if accepted.contains(&preferred) {
        Some(preferred)
    } else {
        accepted.first().copied()
    }
}

fn latest_engine(engines: &SimulatedEngineFactory) -> Result<Arc<SimulatedCaptureEngine>> {
    engines
        .latest()
        .ok_or_else(|| anyhow!("no capture engine was created"))
}

async fn wait_for_phase(workflow: &CaptureWorkflow, phase: LifecyclePhase) -> Result<()> {
    wait_for(workflow, |snapshot| snapshot.phase() == phase)
        .await
        .with_context(|| format!("workflow never reached {phase}"))
}

async fn wait_for(
    workflow: &CaptureWorkflow,
    mut predicate: impl FnMut(&PhaseSnapshot) -> bool,
) -> Result<()> {
    let mut current = workflow.subscribe();
    tokio::time::timeout(PHASE_TIMEOUT, current.wait_for(|snapshot| predicate(snapshot)))
        .await
        .context("timed out waiting for the workflow")??;
    Ok(())
}

fn print_transitions(transitions: &mut broadcast::Receiver<PhaseSnapshot>) {
    loop {
        match transitions.try_recv() {
            Ok(snapshot) => match snapshot.error() {
                Some(error) => println!("   -> {} ({error})", snapshot.phase()),
                None => println!("   -> {}", snapshot.phase()),
            },
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                println!("   ... {skipped} transitions skipped");
            }
            Err(_) => break,
        }
    }
}

fn guidance_command(from: GuidanceState, inputs: &[GuidanceInput]) -> Result<()> {
    let mut state = from;
    println!("🧭 {state}");

    for input in inputs {
        match next_state(state, *input) {
            Some(destination) => {
                println!("   {input} -> {destination}");
                state = destination;
            }
            None => bail!("no transition from {state} for {input}"),
        }
    }

    let accepted: Vec<String> = capture_workflow::guidance::transitions(state)
        .iter()
        .flat_map(|transition| transition.inputs.iter().map(ToString::to_string))
        .collect();
    if accepted.is_empty() {
        println!("✅ Finished at {state}");
    } else {
        println!("⏭️  Accepts: {}", accepted.join(", "));
    }
    Ok(())
}
