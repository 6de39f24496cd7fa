use lshash_store::StoredValue;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Install a thread-local subscriber that records every level down to TRACE.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }

    /// Captured lines containing `needle`.
    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.output()
            .lines()
            .filter(|l| l.contains(needle))
            .map(std::string::ToString::to_string)
            .collect()
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct TempFixtureDir {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TempFixtureDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Write `contents` to `name` inside the directory and return its path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }
}

/// Deterministic vector/bucket-key generator.
#[allow(dead_code)]
pub struct VectorFixtures {
    rng: ChaCha8Rng,
    dim: usize,
}

#[allow(dead_code)]
impl VectorFixtures {
    pub fn new(seed: u64, dim: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            dim,
        }
    }

    /// Any finite f64 bit pattern: subnormals, huge exponents and `-0.0` included.
    fn finite(&mut self) -> f64 {
        loop {
            let candidate = f64::from_bits(self.rng.r#gen::<u64>());
            if candidate.is_finite() {
                return candidate;
            }
        }
    }

    fn components(&mut self) -> Vec<f64> {
        (0..self.dim).map(|_| self.finite()).collect()
    }

    pub fn vector(&mut self) -> StoredValue {
        StoredValue::vector(self.components())
    }

    pub fn labeled(&mut self, id: usize) -> StoredValue {
        let score = self.finite();
        StoredValue::labeled(
            self.components(),
            json!({ "id": id, "tag": format!("doc-{id}"), "score": score }),
        )
    }

    /// Binary bucket key of `bits` characters.
    pub fn bucket_key(&mut self, bits: usize) -> String {
        (0..bits)
            .map(|_| if self.rng.gen_bool(0.5) { '1' } else { '0' })
            .collect()
    }
}
