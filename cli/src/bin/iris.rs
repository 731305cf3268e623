use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use iris_cli::{MaskSummary, Profile, load_edit_script, parse_shape};
use iris_client::{IrisClient, LoadOutcome, SegmentationWorkspace, WorkspaceCommand};
use iris_common::{IrisConfig, MaskShape};
use mask::{
    ClassPalette, DisplayMode, MaskBuffers, MaskEditor, codec, render::save_overlay_png,
    render_overlay,
};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Command line client for the IRIS segmentation backend", long_about = None)]
struct Cli {
    /// Profile file (.toml or .json)
    #[arg(short, long, env = "IRIS_PROFILE")]
    profile: Option<PathBuf>,

    /// Origin of the IRIS server
    #[arg(long, env = "IRIS_URL")]
    backend_url: Option<String>,

    /// Alternative backend base tried first
    #[arg(long, env = "IRIS_BACKEND_URL")]
    custom_backend_url: Option<String>,

    #[arg(short, long, env = "IRIS_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "IRIS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Account operations
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Pull, push and edit segmentation masks
    Mask {
        #[command(subcommand)]
        command: MaskCommand,
    },
    /// Project and model configuration of the current user
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Resolve neighbouring images
    Navigate {
        #[command(subcommand)]
        command: NavigateCommand,
    },
    /// List the workspace hotkeys
    Commands {
        /// Render the help page on the server instead
        #[arg(long)]
        html: bool,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Show the logged-in user
    Whoami,
    /// Check the profile credentials
    Login,
    /// Create an account with the profile credentials
    Register,
}

#[derive(Subcommand)]
enum MaskCommand {
    /// Download the saved mask envelope of an image
    Pull {
        image_id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload a mask envelope for an image
    Push { image_id: String, input: PathBuf },
    /// Print drawing statistics of the saved mask
    Inspect { image_id: String },
    /// Render the saved mask as a PNG overlay
    Render {
        image_id: String,
        #[arg(short, long, default_value = "final")]
        mode: DisplayMode,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge an AI prediction into the saved mask
    Predict {
        image_id: String,
        /// Store the merged mask on the server
        #[arg(long)]
        save: bool,
    },
    /// Run an edit script (JSON array of edit commands) against a mask
    Edit {
        image_id: String,
        script: PathBuf,
        /// Start from an empty mask instead of the saved one
        #[arg(long)]
        fresh: bool,
        /// Print the result without saving
        #[arg(long)]
        dry_run: bool,
    },
    /// Write an empty mask envelope
    New {
        output: PathBuf,
        /// WIDTHxHEIGHT; defaults to the project's mask shape
        #[arg(long)]
        shape: Option<String>,
    },
    /// Print the JSON schema of edit scripts
    Schema,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the user configuration
    Show,
    /// Print the JSON schema of the project configuration
    Schema,
    /// Replace the bands used by the AI model
    SetBands {
        #[arg(required = false)]
        bands: Vec<String>,
    },
    /// Upload a configuration file
    Save { input: PathBuf },
}

#[derive(Subcommand)]
enum NavigateCommand {
    Next { image_id: String },
    Previous { image_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let profile = match &cli.profile {
        Some(path) => Profile::from_file(path)
            .wrap_err_with(|| format!("Unable to read profile {}", path.display()))?,
        None => Profile::default(),
    }
    .with_overrides(
        cli.backend_url.clone(),
        cli.custom_backend_url.clone(),
        cli.username.clone(),
        cli.password.clone(),
    );

    match cli.command {
        Commands::User { command } => run_user(&profile, command).await,
        Commands::Mask { command } => run_mask(&profile, command).await,
        Commands::Config { command } => run_config(&profile, command).await,
        Commands::Navigate { command } => run_navigate(&profile, command).await,
        Commands::Commands { html } => run_commands(&profile, html).await,
    }
}

/// Build the client and log in when the profile has credentials
async fn connect(profile: &Profile) -> Result<IrisClient> {
    let client = build_client(profile)?;
    if let Some((username, password)) = profile.credentials() {
        client.login(username, password).await?;
    }
    Ok(client)
}

fn build_client(profile: &Profile) -> Result<IrisClient> {
    profile.validate()?;
    Ok(IrisClient::builder(&profile.backend_url)
        .custom_base(profile.custom_backend_url.clone())
        .connect_timeout(profile.connect_timeout())
        .build()?)
}

async fn project_config(client: &IrisClient) -> Result<IrisConfig> {
    Ok(client.user_config().await?.config)
}

async fn run_user(profile: &Profile, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Whoami => {
            let client = connect(profile).await?;
            let user = client.current_user().await?;
            println!("{} (#{}) {}", user.name, user.id, user.role());
            if let Some(created) = user.created_at() {
                println!("member since {}", created.format("%Y-%m-%d"));
            }
            println!(
                "segmentation: {} masks, score {:.2}",
                user.segmentation.n_masks, user.segmentation.score
            );
        }
        UserCommand::Login => {
            let (username, password) = profile
                .credentials()
                .ok_or_else(|| eyre!("Login needs a username and a password"))?;
            build_client(profile)?.login(username, password).await?;
            println!("Logged in as {username}");
        }
        UserCommand::Register => {
            let (username, password) = profile
                .credentials()
                .ok_or_else(|| eyre!("Registration needs a username and a password"))?;
            build_client(profile)?.register(username, password).await?;
            println!("Registered {username}");
        }
    }
    Ok(())
}

async fn run_mask(profile: &Profile, command: MaskCommand) -> Result<()> {
    match command {
        MaskCommand::Pull { image_id, output } => {
            let client = connect(profile).await?;
            let config = project_config(&client).await?;
            let Some(buffers) = client.load_mask(&image_id, config.mask_shape()).await? else {
                warn!(image_id, "No saved mask");
                return Ok(());
            };
            let path = output.unwrap_or_else(|| profile.output_path(&image_id, "mask"));
            write_file(&path, &codec::encode(&buffers))?;
            info!(image_id, path = %path.display(), "Mask pulled");
        }
        MaskCommand::Push { image_id, input } => {
            let client = connect(profile).await?;
            let config = project_config(&client).await?;
            let payload = std::fs::read(&input)
                .wrap_err_with(|| format!("Unable to read {}", input.display()))?;
            if codec::decode_for_shape(&payload, config.mask_shape()).is_none() {
                return Err(eyre!(
                    "{} is not a valid mask for shape {}x{}",
                    input.display(),
                    config.mask_shape().width(),
                    config.mask_shape().height()
                ));
            }
            client.save_mask(&image_id, payload).await?;
            println!("Mask saved successfully.");
        }
        MaskCommand::Inspect { image_id } => {
            let client = connect(profile).await?;
            let config = project_config(&client).await?;
            let editor = open_editor(&client, &config, &image_id, false).await?;
            print!(
                "{}",
                MaskSummary::new(&image_id, editor.shape(), editor.stats(), &config.classes)
            );
        }
        MaskCommand::Render {
            image_id,
            mode,
            output,
        } => {
            let client = connect(profile).await?;
            let config = project_config(&client).await?;
            let editor = open_editor(&client, &config, &image_id, false).await?;
            let palette = ClassPalette::from_classes(&config.classes);
            let image = render_overlay(editor.buffers(), editor.shape(), &palette, mode, None)?;
            let path = output.unwrap_or_else(|| profile.output_path(&image_id, "png"));
            ensure_parent(&path)?;
            save_overlay_png(&image, &path)?;
            info!(image_id, mode = %mode, path = %path.display(), "Overlay rendered");
        }
        MaskCommand::Predict { image_id, save } => {
            let client = connect(profile).await?;
            let config = project_config(&client).await?;
            let mut workspace = SegmentationWorkspace::new(config.clone());
            if workspace.load_image(&client, &image_id).await != LoadOutcome::Applied {
                return Err(report_notices(&mut workspace, "Unable to load image"));
            }
            let changed = workspace.predict(&client).await?;
            info!(image_id, changed, "Prediction merged");
            if let Some(editor) = workspace.editor() {
                print!(
                    "{}",
                    MaskSummary::new(&image_id, editor.shape(), editor.stats(), &config.classes)
                );
            }
            if save {
                workspace.save(&client).await?;
                println!("Mask saved successfully.");
            }
        }
        MaskCommand::Edit {
            image_id,
            script,
            fresh,
            dry_run,
        } => {
            let commands = load_edit_script(&script)?;
            let client = connect(profile).await?;
            let config = project_config(&client).await?;
            let mut editor = open_editor(&client, &config, &image_id, fresh).await?;
            for command in &commands {
                let changed = editor.execute(command);
                info!(command = %command, changed, "Applied edit");
            }
            print!(
                "{}",
                MaskSummary::new(&image_id, editor.shape(), editor.stats(), &config.classes)
            );
            if dry_run {
                return Ok(());
            }
            if !editor.mask_available() {
                println!("No mask edits to save yet.");
                return Ok(());
            }
            client.save_mask(&image_id, editor.encode()).await?;
            println!("Mask saved successfully.");
        }
        MaskCommand::New { output, shape } => {
            let shape = match shape {
                Some(raw) => parse_shape(&raw)?,
                None => {
                    let client = connect(profile).await?;
                    project_config(&client).await?.mask_shape()
                }
            };
            write_file(&output, &blank_envelope(shape)?)?;
            info!(path = %output.display(), width = shape.width(), height = shape.height(), "Empty mask written");
        }
        MaskCommand::Schema => {
            println!("{}", serde_json::to_string_pretty(&mask::EditCommand::schema())?);
        }
    }
    Ok(())
}

async fn open_editor(
    client: &IrisClient,
    config: &IrisConfig,
    image_id: &str,
    fresh: bool,
) -> Result<MaskEditor> {
    let shape = config.mask_shape();
    let saved = if fresh {
        None
    } else {
        client.load_mask(image_id, shape).await?
    };
    Ok(MaskEditor::new(shape, saved, config.class_count())?)
}

fn blank_envelope(shape: MaskShape) -> Result<Vec<u8>> {
    Ok(codec::encode(&MaskBuffers::zeroed(shape.len())?))
}

async fn run_config(profile: &Profile, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let client = connect(profile).await?;
            let response = client.user_config().await?;
            println!("{}", serde_json::to_string_pretty(&response.config)?);
            println!("bands: {}", response.config.segmentation.ai_model.bands().join(", "));
            println!("excluded: {}", response.excluded_bands().join(", "));
        }
        ConfigCommand::Schema => {
            println!("{}", serde_json::to_string_pretty(&IrisConfig::schema())?);
        }
        ConfigCommand::SetBands { bands } => {
            let client = connect(profile).await?;
            let mut config = project_config(&client).await?;
            config.segmentation.ai_model.bands = Some(bands);
            save_preferences(&client, config).await?;
        }
        ConfigCommand::Save { input } => {
            let content = std::fs::read_to_string(&input)
                .wrap_err_with(|| format!("Unable to read {}", input.display()))?;
            let config: IrisConfig = serde_json::from_str(&content)?;
            config.validate()?;
            let client = connect(profile).await?;
            save_preferences(&client, config).await?;
        }
    }
    Ok(())
}

async fn save_preferences(client: &IrisClient, config: IrisConfig) -> Result<()> {
    let mut workspace = SegmentationWorkspace::new(config.clone());
    let result = workspace.save_preferences(client, config).await;
    for notice in workspace.drain_notices() {
        println!("{}", notice.message);
    }
    Ok(result?)
}

async fn run_navigate(profile: &Profile, command: NavigateCommand) -> Result<()> {
    let client = connect(profile).await?;
    let image_id = match command {
        NavigateCommand::Next { image_id } => client
            .next_image_id(&image_id)
            .await
            .wrap_err("Unable to load next image")?,
        NavigateCommand::Previous { image_id } => client
            .previous_image_id(&image_id)
            .await
            .wrap_err("Unable to load previous image")?,
    };
    println!("{image_id}");
    Ok(())
}

async fn run_commands(profile: &Profile, html: bool) -> Result<()> {
    let table = WorkspaceCommand::hotkey_table();
    if html {
        let client = connect(profile).await?;
        let page = client.help(&table).await.wrap_err("Unable to load help")?;
        println!("{page}");
        return Ok(());
    }
    for (key, description) in &table {
        println!("{key:<12} {description}");
    }
    Ok(())
}

fn report_notices(workspace: &mut SegmentationWorkspace, fallback: &str) -> color_eyre::Report {
    let messages: Vec<String> = workspace
        .drain_notices()
        .into_iter()
        .map(|notice| notice.message)
        .collect();
    if messages.is_empty() {
        eyre!("{fallback}")
    } else {
        eyre!("{}", messages.join("\n"))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, bytes).wrap_err_with(|| format!("Unable to write {}", path.display()))
}
