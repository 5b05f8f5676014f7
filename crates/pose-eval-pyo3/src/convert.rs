use numpy::{PyReadonlyArrayDyn, PyUntypedArrayMethods};
use pose_core::types::{keypoint_sets_from_flat, COORDS_PER_SET, NUM_KEYPOINTS};
use pose_core::{EvalError, KeypointSet, ScoreSummary};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

pub fn eval_err(e: EvalError) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(e.to_string())
}

/// View any array-like as a float64 NumPy array, converting int arrays and lists.
fn as_f64_array<'py>(obj: &Bound<'py, PyAny>) -> PyResult<PyReadonlyArrayDyn<'py, f64>> {
    if let Ok(arr) = obj.extract::<PyReadonlyArrayDyn<'py, f64>>() {
        return Ok(arr);
    }
    let np = obj.py().import("numpy")?;
    np.call_method1("asarray", (obj, "float64"))?.extract()
}

/// Convert `(n, 4, 2)`, `(4, 2)` or `(n, 8)` arrays into keypoint sets.
///
/// A `(4, 2)` array is one instance; an empty array is zero instances.
pub fn py_to_sets(obj: &Bound<'_, PyAny>) -> PyResult<Vec<KeypointSet>> {
    let arr = as_f64_array(obj)?;
    let shape = arr.shape().to_vec();
    let well_formed = match shape.as_slice() {
        [_, k, 2] => *k == NUM_KEYPOINTS,
        [k, 2] => *k == NUM_KEYPOINTS,
        [_, c] => *c == COORDS_PER_SET,
        [n] => *n == 0,
        _ => false,
    };
    if !well_formed {
        return Err(eval_err(EvalError::ShapeMismatch {
            expected: "an array of shape (n, 4, 2), (4, 2) or (n, 8)".into(),
            got: format!("{:?}", shape),
        }));
    }
    let flat: Vec<f64> = arr.as_array().iter().copied().collect();
    keypoint_sets_from_flat(&flat).map_err(eval_err)
}

pub fn summary_to_py(py: Python<'_>, summary: &ScoreSummary) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("mAP", summary.map)?;
    dict.set_item("num_images", summary.num_images)?;
    dict.set_item("num_gt", summary.num_gt)?;
    dict.set_item("num_pred", summary.num_pred)?;
    dict.set_item("stats", summary.stats())?;

    let per_thr = PyList::empty(py);
    for t in &summary.thresholds {
        let d = PyDict::new(py);
        d.set_item("oks_thr", t.oks_thr)?;
        d.set_item("ap", t.ap)?;
        d.set_item("precision", t.precision)?;
        d.set_item("recall", t.recall)?;
        d.set_item("tp", t.counts.tp)?;
        d.set_item("fp", t.counts.fp)?;
        d.set_item("fn", t.counts.fn_)?;
        per_thr.append(d)?;
    }
    dict.set_item("thresholds", per_thr)?;
    Ok(dict.into_any().unbind())
}
