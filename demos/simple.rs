// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use lambda_profiler_agent::{
    metadata::InvocationIdentity,
    options::ProfileBuilder,
    profiler::Profile,
    store::local::LocalStore,
};
use std::time::Duration;

use clap::{ArgGroup, Parser};

mod slow;

pub fn set_up_tracing() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    let format = tracing_subscriber::fmt::layer().pretty();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(format)
        .with(filter)
        .init();
}

/// Simple program to profile one simulated invocation
#[derive(Parser, Debug)]
#[command(group(
    ArgGroup::new("destination")
        .args(["local", "region"]),
))]
struct Args {
    /// Bucket to persist the profile into
    #[arg(long)]
    bucket: Option<String>,
    /// Region of the bucket
    #[arg(long)]
    region: Option<String>,
    /// Persist into this directory instead of S3
    #[arg(long)]
    local: Option<String>,
    /// Profile memory allocations instead of CPU time
    #[arg(long)]
    mem: bool,
    /// Don't log async-profiler's own output
    #[arg(long)]
    quiet: bool,
    #[arg(long, requires = "request_id")]
    function_arn: Option<String>,
    #[arg(long, requires = "function_arn")]
    request_id: Option<String>,
    #[arg(long, default_value = "5s")]
    #[clap(value_parser = humantime::parse_duration)]
    duration: Duration,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    set_up_tracing();
    tracing::info!("main started");

    let args = Args::parse();

    let mut builder = ProfileBuilder::default();
    if args.quiet {
        builder = builder.quiet();
    }
    if args.mem {
        builder = builder.mem_profile();
    } else {
        builder = builder.cpu_profile();
    }
    if let Some(bucket) = args.bucket {
        builder = builder.s3_bucket(bucket);
    }
    if let Some(region) = args.region {
        builder = builder.aws_region(region);
    }

    tracing::info!("starting profiler");
    let profile = Profile::start(builder)?;
    tracing::info!("profiler started");

    tokio::time::timeout(args.duration, slow::run())
        .await
        .unwrap_err();

    let invocation = match (args.function_arn, args.request_id) {
        (Some(function_arn), Some(request_id)) => {
            Some(InvocationIdentity::new(function_arn, request_id))
        }
        _ => None,
    };
    match args.local {
        Some(local) => {
            profile
                .stop_with_store(&LocalStore::new(local), invocation.as_ref())
                .await?
        }
        None => profile.stop(invocation.as_ref()).await?,
    }
    tracing::info!("profile persisted");

    Ok(())
}
