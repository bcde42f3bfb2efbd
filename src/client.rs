//! Client subcommands that drive a running endpoint over HTTP.
//!
//! The endpoint is treated as a black box: these commands only speak the
//! public `/invocations` surface.

use std::path::Path;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

use crate::api::{ErrorBody, PredictRequest, PredictResponse};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {message}")]
    Endpoint {
        status: StatusCode,
        message: String,
    },
}

pub struct InvokeOptions<'a> {
    pub endpoint: &'a str,
    pub file: &'a Path,
    /// Post raw bytes instead of the base64 JSON envelope.
    pub raw: bool,
    /// Output format (json, text, pretty).
    pub output: &'a str,
}

pub struct BenchOptions<'a> {
    pub endpoint: &'a str,
    pub file: &'a Path,
    pub raw: bool,
    pub iterations: usize,
}

/// Post a single image and print the detections.
pub async fn invoke(options: &InvokeOptions<'_>) -> Result<(), ClientError> {
    let client = reqwest::Client::new();
    let (response, elapsed_ms) =
        send_invocation(&client, options.endpoint, options.file, options.raw).await?;
    print_response(&response, elapsed_ms, options.output);
    Ok(())
}

/// Post the same image repeatedly and report latency statistics.
pub async fn bench(options: &BenchOptions<'_>) -> Result<(), ClientError> {
    let client = reqwest::Client::new();
    let iterations = options.iterations.max(1);

    println!(
        "Benchmarking {} with {} ({} iterations)",
        options.endpoint,
        options.file.display(),
        iterations
    );

    let mut times = Vec::with_capacity(iterations);
    let mut last: Option<PredictResponse> = None;

    for i in 0..iterations {
        let (response, elapsed_ms) =
            send_invocation(&client, options.endpoint, options.file, options.raw).await?;
        println!(
            "  [{}/{}] {:.1} ms, {} detections",
            i + 1,
            iterations,
            elapsed_ms,
            response.count
        );
        times.push(elapsed_ms);
        last = Some(response);
    }

    let (avg, min, max) = latency_stats(&times);
    println!();
    println!("Latency: avg {avg:.1} ms, min {min:.1} ms, max {max:.1} ms");

    if let Some(response) = last {
        println!(
            "Detections: {} (gpu_enabled: {})",
            response.count, response.gpu_enabled
        );
        for (idx, detection) in response.detections.iter().enumerate() {
            println!(
                "  [{}] \"{}\" ({:.1}%)",
                idx + 1,
                detection.text,
                detection.confidence * 100.0
            );
        }
    }

    Ok(())
}

/// Send one invocation and measure the round trip.
async fn send_invocation(
    client: &reqwest::Client,
    endpoint: &str,
    file: &Path,
    raw: bool,
) -> Result<(PredictResponse, f64), ClientError> {
    let bytes = std::fs::read(file).map_err(|source| ClientError::Io {
        path: file.display().to_string(),
        source,
    })?;
    let url = format!("{}/invocations", endpoint.trim_end_matches('/'));

    info!(url = %url, bytes = bytes.len(), raw, "Posting invocation");

    let start = Instant::now();
    let request = if raw {
        client
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
    } else {
        client.post(&url).json(&PredictRequest {
            image: BASE64.encode(&bytes),
        })
    };
    let response = request.send().await?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| "<no error body>".to_string());
        return Err(ClientError::Endpoint { status, message });
    }

    Ok((response.json::<PredictResponse>().await?, elapsed_ms))
}

fn latency_stats(times: &[f64]) -> (f64, f64, f64) {
    let min = times.iter().copied().fold(f64::INFINITY, f64::min);
    let max = times.iter().copied().fold(0.0_f64, f64::max);
    let avg = times.iter().sum::<f64>() / times.len().max(1) as f64;
    (avg, min, max)
}

/// Print the response in the requested format.
fn print_response(response: &PredictResponse, elapsed_ms: f64, format: &str) {
    match format {
        "json" => {
            println!("{}", serde_json::to_string(response).unwrap());
        }
        "text" => {
            for detection in &response.detections {
                println!("{}", detection.text);
            }
        }
        _ => {
            println!("\n=== OCR Results ===");
            println!("Round trip: {elapsed_ms:.1} ms");
            println!(
                "Detections: {} (gpu_enabled: {})",
                response.count, response.gpu_enabled
            );
            println!();

            if response.detections.is_empty() {
                println!("No text detected.");
            } else {
                for (idx, detection) in response.detections.iter().enumerate() {
                    println!(
                        "[{}] \"{}\" ({:.1}%)",
                        idx + 1,
                        detection.text,
                        detection.confidence * 100.0
                    );
                    if let (Some(first), Some(last)) =
                        (detection.bbox.first(), detection.bbox.get(2))
                    {
                        println!(
                            "    Position: [{:.1}, {:.1}] - [{:.1}, {:.1}]",
                            first[0], first[1], last[0], last[1]
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats() {
        let (avg, min, max) = latency_stats(&[10.0, 20.0, 30.0]);
        assert!((avg - 20.0).abs() < f64::EPSILON);
        assert!((min - 10.0).abs() < f64::EPSILON);
        assert!((max - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latency_stats_single_sample() {
        let (avg, min, max) = latency_stats(&[42.0]);
        assert!((avg - 42.0).abs() < f64::EPSILON);
        assert!((min - 42.0).abs() < f64::EPSILON);
        assert!((max - 42.0).abs() < f64::EPSILON);
    }
}
