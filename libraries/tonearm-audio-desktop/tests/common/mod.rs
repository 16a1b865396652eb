//! Fixtures shared by the desktop integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tonearm_playback::{AudioContext, ContextState, Deferred, GraphRenderer, OutputFormat};

/// Write a 440 Hz stereo sine WAV file
pub fn write_sine_wav(path: &Path, sample_rate: u32, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
        let value = (sample * i16::MAX as f32) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

/// Temp dir holding one WAV fixture
pub fn wav_fixture(seconds: f32) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_sine_wav(&path, 44100, seconds);
    (dir, path)
}

/// Serve one HTTP response on a local port
///
/// Returns the base URL (`http://127.0.0.1:<port>`).
pub async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = vec![0u8; 8192];
        socket.read(&mut request).await.ok();

        let header = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: audio/wav\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        socket.write_all(header.as_bytes()).await.ok();
        socket.write_all(&body).await.ok();
        socket.shutdown().await.ok();
    });

    format!("http://{}", addr)
}

/// Audio context driven by the test instead of a device
pub struct ManualContext {
    state: ContextState,
    renderer: Arc<Mutex<Option<GraphRenderer>>>,
}

impl ManualContext {
    pub fn new() -> (Self, ManualOutput) {
        let renderer = Arc::new(Mutex::new(None));
        (
            Self {
                state: ContextState::Suspended,
                renderer: Arc::clone(&renderer),
            },
            ManualOutput { renderer },
        )
    }
}

impl AudioContext for ManualContext {
    fn state(&self) -> ContextState {
        self.state
    }

    fn format(&self) -> OutputFormat {
        OutputFormat {
            sample_rate: 44100,
            channels: 2,
        }
    }

    fn resume(&mut self) -> Deferred {
        self.state = ContextState::Running;
        Box::pin(async { Ok(()) })
    }

    fn connect(&mut self, renderer: GraphRenderer) -> tonearm_playback::Result<()> {
        *self.renderer.lock().unwrap() = Some(renderer);
        Ok(())
    }

    fn close(&mut self) -> tonearm_playback::Result<()> {
        self.state = ContextState::Closed;
        Ok(())
    }
}

/// Test-side handle pulling buffers from the connected graph
#[derive(Clone)]
pub struct ManualOutput {
    renderer: Arc<Mutex<Option<GraphRenderer>>>,
}

impl ManualOutput {
    /// Render `frames` stereo frames, like one device callback
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0f32; frames * 2];
        if let Some(renderer) = self.renderer.lock().unwrap().as_mut() {
            renderer.render(&mut buffer, 2);
        }
        buffer
    }
}
