// Copyright (c) 2026 appujet, notdeltaxd and contributors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use hlsfetch::common::AnyResult;
use hlsfetch::configs::Config;
use hlsfetch::progress::InProcessProgress;
use hlsfetch::{DownloadJob, JobOutcome, JobRegistry, PipelineController};

/// Downloads a remote HLS stream to a single local media file.
#[derive(Parser, Debug)]
#[command(name = "hlsfetch", version)]
struct Cli {
    /// The `.m3u8` playlist URL to download.
    url: String,

    /// Output basename (extension is chosen from the detected container).
    #[arg(short, long, default_value = "out")]
    output: String,

    /// Directory the output file is written under.
    #[arg(short, long)]
    dir: Option<String>,

    /// Maximum concurrent jobs (overrides config.toml).
    #[arg(long)]
    max_concurrent_jobs: Option<usize>,

    /// Split a large-regime output into `<output>_partN.<ext>` files
    /// instead of writing a single file.
    #[arg(long)]
    part_mode: bool,
}

#[tokio::main]
async fn main() -> AnyResult<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(max_concurrent_jobs) = cli.max_concurrent_jobs {
        config.fetch.max_concurrent_jobs = max_concurrent_jobs;
    }

    hlsfetch::common::logger::init(&config);
    hlsfetch::common::banner::print_banner(&hlsfetch::common::banner::BannerInfo::default());

    info!(url = %cli.url, "hlsfetch starting");

    let registry = Arc::new(JobRegistry::new());
    let progress = Arc::new(InProcessProgress::new());
    let controller = PipelineController::new(registry, progress)?;

    let output_dir = cli.dir.unwrap_or(config.output.dir.clone());
    let job = DownloadJob::new(cli.url, cli.output, output_dir, config.fetch.clone())
        .with_part_mode(cli.part_mode);

    match controller.run(job).await {
        JobOutcome::Done { output_path } => {
            info!(path = %output_path.display(), "download complete");
            Ok(ExitCode::SUCCESS)
        }
        JobOutcome::DonePartitioned { part_paths } => {
            info!(parts = part_paths.len(), "download complete");
            for path in &part_paths {
                info!(path = %path.display(), "wrote part");
            }
            Ok(ExitCode::SUCCESS)
        }
        JobOutcome::Cancelled => {
            error!("download cancelled");
            Ok(ExitCode::FAILURE)
        }
        JobOutcome::Failed(err) => {
            error!(error = %err, kind = err.kind(), "download failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
