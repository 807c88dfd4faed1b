//! Safetensors container for raw fNIRS recordings.
//!
//! One file per recording, tensors:
//!
//! | name               | dtype    | shape  | content                           |
//! |--------------------|----------|--------|-----------------------------------|
//! | `data`             | F32/F64  | [C, T] | light intensity                   |
//! | `sfreq`            | F32/F64  | [1]    | sampling rate, Hz                 |
//! | `distance`         | F32/F64  | [C]    | source–detector distance, metres  |
//! | `wavelength`       | F32/F64  | [C]    | nm                                |
//! | `ch_names`         | U8       | [n]    | newline-separated `"S1_D1 760"`   |
//! | `annot_onset`      | F32/F64  | [A]    | seconds from the first sample     |
//! | `annot_duration`   | F32/F64  | [A]    | seconds                           |
//! | `annot_description`| U8       | [n]    | newline-separated labels          |
//!
//! The annotation tensors may be absent when a recording has no events.
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;

use crate::recording::{pair_of, Annotation, Channel, Measure, Recording};

// ── Low-level parser ─────────────────────────────────────────────────────────

struct Tensor<'a> {
    dtype: String,
    shape: Vec<usize>,
    bytes: &'a [u8],
}

fn parse(bytes: &[u8]) -> Result<HashMap<String, Tensor<'_>>> {
    let Some(len) = bytes.get(..8) else {
        bail!("safetensors file too small");
    };
    let n = u64::from_le_bytes(len.try_into()?) as usize;
    let header_end = 8usize.checked_add(n).filter(|&e| e <= bytes.len()).context("truncated header")?;
    let header: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes[8..header_end]).context("failed to parse safetensors header")?;
    let payload = &bytes[header_end..];

    let mut out = HashMap::new();
    for (name, entry) in header {
        if name == "__metadata__" {
            continue;
        }
        let dtype = entry["dtype"].as_str().context("missing dtype")?.to_string();
        let shape = entry["shape"]
            .as_array()
            .context("missing shape")?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize).context("bad shape"))
            .collect::<Result<Vec<_>>>()?;
        let offsets = entry["data_offsets"].as_array().context("missing data_offsets")?;
        let (s, e) = match offsets.as_slice() {
            [s, e] => (
                s.as_u64().context("bad offset")? as usize,
                e.as_u64().context("bad offset")? as usize,
            ),
            _ => bail!("tensor {name}: data_offsets must have two entries"),
        };
        let bytes = payload.get(s..e).with_context(|| format!("tensor {name} out of bounds"))?;
        out.insert(name, Tensor { dtype, shape, bytes });
    }
    Ok(out)
}

impl Tensor<'_> {
    fn to_f64(&self) -> Result<Vec<f64>> {
        match self.dtype.as_str() {
            "F32" => Ok(self
                .bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect()),
            "F64" => Ok(self
                .bytes
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect()),
            other => bail!("expected a float tensor, found {other}"),
        }
    }

    fn to_lines(&self) -> Result<Vec<String>> {
        let text = std::str::from_utf8(self.bytes)?;
        Ok(text.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
    }
}

fn get<'a, 'b>(t: &'b HashMap<String, Tensor<'a>>, name: &str) -> Result<&'b Tensor<'a>> {
    t.get(name).with_context(|| format!("missing '{name}' tensor"))
}

// ── Recording container ──────────────────────────────────────────────────────

/// Read a raw-intensity recording.
pub fn read_recording(path: &Path) -> Result<Recording> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let t = parse(&bytes)?;

    let data_t = get(&t, "data")?;
    let [n_ch, n_t] = data_t.shape[..] else {
        bail!("'data' must be 2-D, found shape {:?}", data_t.shape);
    };
    let data = Array2::from_shape_vec((n_ch, n_t), data_t.to_f64()?)?;
    let sfreq = *get(&t, "sfreq")?.to_f64()?.first().context("empty 'sfreq'")?;
    let distance = get(&t, "distance")?.to_f64()?;
    let wavelength = get(&t, "wavelength")?.to_f64()?;
    let names = get(&t, "ch_names")?.to_lines()?;
    if distance.len() != n_ch || wavelength.len() != n_ch || names.len() != n_ch {
        bail!(
            "{n_ch} data rows but {} names, {} distances, {} wavelengths",
            names.len(),
            distance.len(),
            wavelength.len()
        );
    }
    let channels = names
        .iter()
        .zip(distance.iter().zip(&wavelength))
        .map(|(name, (&d, &w))| Channel {
            name: name.clone(),
            pair: pair_of(name).to_string(),
            distance: d,
            measure: Measure::Wavelength(w),
        })
        .collect();

    let annotations = match t.get("annot_onset") {
        None => vec![],
        Some(onset) => {
            let onset = onset.to_f64()?;
            let duration = get(&t, "annot_duration")?.to_f64()?;
            let labels = get(&t, "annot_description")?.to_lines()?;
            if duration.len() != onset.len() || labels.len() != onset.len() {
                bail!(
                    "{} onsets, {} durations, {} descriptions",
                    onset.len(),
                    duration.len(),
                    labels.len()
                );
            }
            onset
                .into_iter()
                .zip(duration)
                .zip(labels)
                .map(|((o, d), l)| Annotation::new(o, d, l))
                .collect()
        }
    };

    Ok(Recording::new(data, sfreq, channels, annotations)?)
}

/// Write a raw-intensity recording (F64 throughout).
pub fn write_recording(rec: &Recording, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f64_arr2("data", &rec.data);
    w.add_f64("sfreq", &[rec.sfreq], &[1]);
    let distance: Vec<f64> = rec.channels.iter().map(|c| c.distance).collect();
    w.add_f64("distance", &distance, &[distance.len()]);
    let wavelength = rec
        .channels
        .iter()
        .map(|c| c.wavelength().with_context(|| format!("channel {} has no wavelength", c.name)))
        .collect::<Result<Vec<f64>>>()?;
    w.add_f64("wavelength", &wavelength, &[wavelength.len()]);
    w.add_lines("ch_names", rec.channels.iter().map(|c| c.name.as_str()));

    if !rec.annotations.is_empty() {
        let onset: Vec<f64> = rec.annotations.iter().map(|a| a.onset).collect();
        let duration: Vec<f64> = rec.annotations.iter().map(|a| a.duration).collect();
        w.add_f64("annot_onset", &onset, &[onset.len()]);
        w.add_f64("annot_duration", &duration, &[duration.len()]);
        w.add_lines("annot_description", rec.annotations.iter().map(|a| a.description.as_str()));
    }
    w.write(path)
}

// ── Generic safetensors builder ──────────────────────────────────────────────

/// Minimal safetensors writer for F32, F64 and U8 tensors.
///
/// ```rust,no_run
/// use nirs_glm::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("sfreq", &[7.8125], &[1]);
/// w.add_lines("ch_names", ["S1_D1 760", "S1_D1 850"]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    /// Newline-joined UTF-8 strings as a U8 tensor.
    pub fn add_lines<'a>(&mut self, name: &str, lines: impl IntoIterator<Item = &'a str>) {
        let bytes = lines.into_iter().collect::<Vec<_>>().join("\n").into_bytes();
        let len = bytes.len();
        self.entries.push((name.to_string(), bytes, "U8", vec![len]));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(
                name.clone(),
                serde_json::json!({
                    "dtype": dtype,
                    "shape": shape,
                    "data_offsets": [offset, offset + data.len()],
                }),
            );
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter().chain(std::iter::repeat(b' ').take(pad)).collect();
        let mut f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Recording {
        let data = Array2::from_shape_fn((2, 5), |(c, t)| 1.0 + (c * 5 + t) as f64 * 0.25);
        Recording::new(
            data,
            7.8125,
            vec![Channel::intensity("S1_D1", 760.0, 0.03), Channel::intensity("S1_D1", 850.0, 0.03)],
            vec![Annotation::new(1.5, 5.0, "Tapping/Left"), Annotation::new(20.0, 5.0, "Control")],
        )
        .unwrap()
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.safetensors");
        let rec = sample();
        write_recording(&rec, &path).unwrap();
        let back = read_recording(&path).unwrap();
        assert_eq!(back.data, rec.data);
        assert_eq!(back.channels, rec.channels);
        assert_eq!(back.annotations, rec.annotations);
        approx::assert_abs_diff_eq!(back.sfreq, 7.8125);
    }

    #[test]
    fn f32_data_and_missing_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.safetensors");
        let mut w = StWriter::new();
        w.add_f32("data", &[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        w.add_f32("sfreq", &[10.0], &[1]);
        w.add_f32("distance", &[0.03, 0.03], &[2]);
        w.add_f32("wavelength", &[760.0, 850.0], &[2]);
        w.add_lines("ch_names", ["S1_D1 760", "S1_D1 850"]);
        w.write(&path).unwrap();

        let rec = read_recording(&path).unwrap();
        assert_eq!(rec.data[[1, 0]], 3.0);
        assert!(rec.annotations.is_empty());
        assert_eq!(rec.channels[1].pair, "S1_D1");
        assert_eq!(rec.channels[1].wavelength(), Some(850.0));
    }

    #[test]
    fn name_count_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.safetensors");
        let mut w = StWriter::new();
        w.add_f64("data", &[1.0, 2.0], &[2, 1]);
        w.add_f64("sfreq", &[10.0], &[1]);
        w.add_f64("distance", &[0.03, 0.03], &[2]);
        w.add_f64("wavelength", &[760.0, 850.0], &[2]);
        w.add_lines("ch_names", ["S1_D1 760"]);
        w.write(&path).unwrap();
        assert!(read_recording(&path).is_err());
    }

    #[test]
    fn truncated_file_is_an_error() {
        assert!(parse(&[1, 2, 3]).is_err());
        assert!(parse(&[255, 0, 0, 0, 0, 0, 0, 0, b'{']).is_err());
    }
}
