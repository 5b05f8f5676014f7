use pose_core::{Frame, ImageAnnotation, ImagePrediction, OksMatrix, Params, RunningScore};
use pyo3::prelude::*;

mod convert;

use convert::{eval_err, py_to_sets, summary_to_py};

fn image_pair(
    gt: &Bound<'_, PyAny>,
    pred: &Bound<'_, PyAny>,
    frame: Frame,
) -> PyResult<(ImageAnnotation, ImagePrediction)> {
    let gt = ImageAnnotation::new(frame, py_to_sets(gt)?);
    let pred = ImagePrediction::from_sets(frame, py_to_sets(pred)?);
    Ok((gt, pred))
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// OKS matrix (ground truth rows, prediction columns) for one image.
#[pyfunction]
#[pyo3(signature = (gt, pred, width=640, height=400))]
fn compute_oks(
    gt: &Bound<'_, PyAny>,
    pred: &Bound<'_, PyAny>,
    width: u32,
    height: u32,
) -> PyResult<Vec<Vec<f64>>> {
    let params = Params {
        frame: Frame::new(width, height),
        ..Params::new()
    };
    let (gt, pred) = image_pair(gt, pred, params.frame)?;
    let oks = pose_core::compute_oks(&gt, &pred, &params).map_err(eval_err)?;
    Ok(oks.to_rows())
}

// ---------------------------------------------------------------------------
// PoseRunningScore
// ---------------------------------------------------------------------------

#[pyclass(name = "PoseRunningScore")]
struct PyPoseRunningScore {
    params: Params,
    /// `None` once the score has been finalized.
    inner: Option<RunningScore>,
}

impl PyPoseRunningScore {
    fn running_ref(&self) -> PyResult<&RunningScore> {
        self.inner.as_ref().ok_or_else(|| {
            pyo3::exceptions::PyRuntimeError::new_err("score has already been finalized")
        })
    }

    fn running(&mut self) -> PyResult<&mut RunningScore> {
        self.inner.as_mut().ok_or_else(|| {
            pyo3::exceptions::PyRuntimeError::new_err("score has already been finalized")
        })
    }

    fn take(&mut self) -> PyResult<RunningScore> {
        self.inner.take().ok_or_else(|| {
            pyo3::exceptions::PyRuntimeError::new_err("score has already been finalized")
        })
    }
}

#[pymethods]
impl PyPoseRunningScore {
    #[new]
    #[pyo3(signature = (oks_thrs=None, match_threshold=0.0, width=640, height=400))]
    fn new(
        oks_thrs: Option<Vec<f64>>,
        match_threshold: f64,
        width: u32,
        height: u32,
    ) -> PyResult<Self> {
        let mut params = Params::new();
        if let Some(thrs) = oks_thrs {
            params.oks_thrs = thrs;
        }
        params.match_threshold = match_threshold;
        params.frame = Frame::new(width, height);
        let inner = RunningScore::new(params.clone()).map_err(eval_err)?;
        Ok(PyPoseRunningScore {
            inner: Some(inner),
            params,
        })
    }

    /// OKS matrix using this score's frame and falloffs.
    fn compute_oks(
        &self,
        gt: &Bound<'_, PyAny>,
        pred: &Bound<'_, PyAny>,
    ) -> PyResult<Vec<Vec<f64>>> {
        let (gt, pred) = image_pair(gt, pred, self.params.frame)?;
        let oks = pose_core::compute_oks(&gt, &pred, &self.params).map_err(eval_err)?;
        Ok(oks.to_rows())
    }

    /// Add a batch of images. OKS matrices are computed when `oks` is omitted.
    ///
    /// The batch is applied all-or-nothing.
    #[pyo3(signature = (gt_batch, pred_batch, oks=None))]
    fn update(
        &mut self,
        gt_batch: Vec<Bound<'_, PyAny>>,
        pred_batch: Vec<Bound<'_, PyAny>>,
        oks: Option<Vec<Vec<Vec<f64>>>>,
    ) -> PyResult<()> {
        let frame = self.params.frame;
        if gt_batch.len() != pred_batch.len() {
            return Err(eval_err(pose_core::EvalError::BatchLength {
                gts: gt_batch.len(),
                preds: pred_batch.len(),
                oks: oks.as_ref().map_or(gt_batch.len(), Vec::len),
            }));
        }
        let mut gts = Vec::with_capacity(gt_batch.len());
        let mut preds = Vec::with_capacity(pred_batch.len());
        for (g, p) in gt_batch.iter().zip(&pred_batch) {
            let (g, p) = image_pair(g, p, frame)?;
            gts.push(g);
            preds.push(p);
        }

        let matrices: Vec<OksMatrix> = match oks {
            Some(rows) => {
                if rows.len() != preds.len() {
                    return Err(eval_err(pose_core::EvalError::BatchLength {
                        gts: gts.len(),
                        preds: preds.len(),
                        oks: rows.len(),
                    }));
                }
                rows.iter()
                    .zip(&preds)
                    .map(|(r, p)| OksMatrix::from_rows_with_cols(r, p.len()))
                    .collect::<Result<_, _>>()
                    .map_err(eval_err)?
            }
            None => gts
                .iter()
                .zip(&preds)
                .map(|(g, p)| pose_core::compute_oks(g, p, &self.params))
                .collect::<Result<_, _>>()
                .map_err(eval_err)?,
        };

        self.running()?
            .update_batch(&gts, &preds, &matrices)
            .map_err(eval_err)
    }

    /// `(tp, fp, fn)` at one OKS threshold, without finalizing.
    fn counts(&self, oks_thr: f64) -> PyResult<(usize, usize, usize)> {
        let c = self.running_ref()?.counts(oks_thr);
        Ok((c.tp, c.fp, c.fn_))
    }

    #[getter]
    fn num_images(&self) -> PyResult<usize> {
        Ok(self.running_ref()?.num_images())
    }

    /// Finalize and return the mAP. May be called once.
    #[pyo3(name = "get_mAP")]
    fn get_map(&mut self) -> PyResult<f64> {
        Ok(self.take()?.get_map())
    }

    /// Finalize and return the full summary as a dict. May be called once.
    fn finalize(&mut self, py: Python<'_>) -> PyResult<PyObject> {
        let summary = self.take()?.finalize();
        summary_to_py(py, &summary)
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

#[pymodule]
fn pose_eval_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyPoseRunningScore>()?;
    m.add_function(wrap_pyfunction!(compute_oks, m)?)?;
    Ok(())
}
