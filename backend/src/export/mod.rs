//! Export - end-of-run persistence of the run logs
//!
//! Every writer produces JSON Lines: one self-contained JSON object per
//! line, one line per record. Writers only read the environment; they are
//! meant to be called after the run (never inside a tick).
//!
//! | Writer | One line per |
//! |--------|--------------|
//! | [`write_header`] | run (configuration and summary) |
//! | [`write_final_positions`] | robot |
//! | [`dump_messages_to_file`] | delivered packet |
//! | [`dump_error_to_file`] | step |
//! | [`write_distance_data`] | step (aggregate) and robot per step |

use crate::environment::{compute_config_hash, Environment};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config hash failed: {0}")]
    ConfigHash(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `records` to `path`, one JSON object per line
fn write_lines<T: Serialize>(
    path: &Path,
    records: impl IntoIterator<Item = T>,
) -> Result<usize, ExportError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    let mut count = 0;

    for record in records {
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n").map_err(io_error(path))?;
        count += 1;
    }

    writer.flush().map_err(io_error(path))?;
    info!(path = %path.display(), lines = count, "export written");
    Ok(count)
}

/// Run header: configuration, config hash and end-of-run summary
pub fn write_header(path: &Path, env: &Environment) -> Result<(), ExportError> {
    let config_hash = compute_config_hash(env.config())
        .map_err(|e| ExportError::ConfigHash(e.to_string()))?;
    let header = json!({
        "config": env.config(),
        "config_hash": config_hash,
        "steps": env.step_count(),
        "cells": env.n_cells(),
        "robots": env.n_robots(),
        "free_robots": env.n_free_robots(),
        "quiescent": env.quiescence(),
        "total_messages": env.total_messages(),
        "formation_id": env.formation().id(),
    });
    write_lines(path, [header])?;
    Ok(())
}

/// Final pose and assignment of every robot
pub fn write_final_positions(path: &Path, env: &Environment) -> Result<usize, ExportError> {
    write_lines(
        path,
        env.robots().map(|robot| {
            json!({
                "robot": robot.id(),
                "x": robot.pose().x,
                "y": robot.pose().y,
                "z": robot.pose().z,
                "heading": robot.pose().heading,
                "cell": robot.cell(),
                "distance_traveled": robot.distance_traveled(),
            })
        }),
    )
}

/// Every delivered packet, in delivery order
pub fn dump_messages_to_file(path: &Path, env: &Environment) -> Result<usize, ExportError> {
    write_lines(path, env.message_log())
}

/// Aggregate error and quiescence streak per step
pub fn dump_error_to_file(path: &Path, env: &Environment) -> Result<usize, ExportError> {
    write_lines(path, env.error_log())
}

/// Distance traveled: per-step aggregates to `path`, per-robot totals for
/// every step to `path2`
pub fn write_distance_data(
    path: &Path,
    path2: &Path,
    env: &Environment,
) -> Result<(usize, usize), ExportError> {
    let aggregates = write_lines(
        path,
        env.distance_log().iter().map(|sample| {
            json!({
                "step": sample.step,
                "total_distance": sample.total_distance,
                "step_distance": sample.step_distance,
            })
        }),
    )?;

    let per_robot = write_lines(
        path2,
        env.distance_log().iter().flat_map(|sample| {
            sample.per_robot.iter().map(move |(robot, distance)| {
                json!({
                    "step": sample.step,
                    "robot": robot,
                    "distance": distance,
                })
            })
        }),
    )?;

    Ok((aggregates, per_robot))
}

/// Write every export into `dir` under fixed file names
pub fn export_all(dir: &Path, env: &Environment) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    let paths = [
        "header.jsonl",
        "final_positions.jsonl",
        "messages.jsonl",
        "errors.jsonl",
        "distance.jsonl",
        "distance_per_robot.jsonl",
    ]
    .map(|name| dir.join(name));

    write_header(&paths[0], env)?;
    write_final_positions(&paths[1], env)?;
    dump_messages_to_file(&paths[2], env)?;
    dump_error_to_file(&paths[3], env)?;
    write_distance_data(&paths[4], &paths[5], env)?;

    Ok(paths.to_vec())
}
