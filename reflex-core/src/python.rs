//! Python Bindings
//!
//! Exposes a reactive mapping (`Store`) and `effect(fn)` to Python. Built
//! only with the `python` feature.
//!
//! Python values cross the boundary by conversion: `None`, `bool`, `int`,
//! `float`, and `str` map to primitives, `dict` and `list` become targets.
//! Nested objects read back out come back as `Store`s over the same target.

use pyo3::exceptions::{PyKeyError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyList, PyLong, PyString, PyTuple};

use crate::error::ReactiveError;
use crate::reactive::{reactive, Effect, Reactive, Target};
use crate::value::{Key, Value};

impl From<ReactiveError> for PyErr {
    fn from(err: ReactiveError) -> Self {
        match err {
            ReactiveError::UnknownProperty(name) => PyKeyError::new_err(name),
            ReactiveError::Unsupported { .. } | ReactiveError::InvalidData(_) => {
                PyTypeError::new_err(err.to_string())
            }
            other => PyValueError::new_err(other.to_string()),
        }
    }
}

fn key_from_py(key: &Bound<'_, PyAny>) -> PyResult<Key> {
    if key.is_instance_of::<PyBool>() {
        Ok(Key::Bool(key.extract()?))
    } else if key.is_instance_of::<PyLong>() {
        Ok(Key::Int(key.extract()?))
    } else if key.is_instance_of::<PyString>() {
        Ok(Key::Str(key.extract()?))
    } else {
        Err(PyTypeError::new_err("keys must be str, int, or bool"))
    }
}

fn value_from_py(value: &Bound<'_, PyAny>) -> PyResult<Value> {
    if value.is_none() {
        return Ok(Value::Null);
    }
    if value.is_instance_of::<PyBool>() {
        return Ok(Value::Bool(value.extract()?));
    }
    if value.is_instance_of::<PyLong>() {
        return Ok(Value::Int(value.extract()?));
    }
    if value.is_instance_of::<PyFloat>() {
        return Ok(Value::Float(value.extract()?));
    }
    if value.is_instance_of::<PyString>() {
        return Ok(Value::Str(value.extract()?));
    }
    if let Ok(store) = value.downcast::<PyStore>() {
        return Ok(Value::Proxy(store.borrow().inner.clone()));
    }
    if let Ok(dict) = value.downcast::<PyDict>() {
        let target = Target::object();
        for (key, item) in dict.iter() {
            target.insert(key_from_py(&key)?, value_from_py(&item)?)?;
        }
        return Ok(Value::Object(target));
    }
    if value.is_instance_of::<PyList>() || value.is_instance_of::<PyTuple>() {
        let items = value
            .iter()?
            .map(|item| value_from_py(&item?))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(Value::Object(Target::array_from(items)));
    }
    Err(PyTypeError::new_err(format!(
        "cannot store {} in a Store",
        value.get_type().name()?
    )))
}

fn value_to_py(py: Python<'_>, value: Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::Undefined | Value::Null => py.None(),
        Value::Bool(b) => b.into_py(py),
        Value::Int(i) => i.into_py(py),
        Value::Float(f) => f.into_py(py),
        Value::Str(s) => s.into_py(py),
        Value::Proxy(inner) => Py::new(py, PyStore { inner })?.into_py(py),
        Value::Object(target) => match reactive(&Value::Object(target)).into_proxy() {
            Some(inner) => Py::new(py, PyStore { inner })?.into_py(py),
            None => py.None(),
        },
    })
}

/// A reactive mapping.
#[pyclass(name = "Store")]
pub struct PyStore {
    inner: Reactive,
}

#[pymethods]
impl PyStore {
    /// Create a store from a dict (or nothing, for an empty store).
    #[new]
    #[pyo3(signature = (data = None))]
    fn new(data: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let value = match data {
            Some(dict) => value_from_py(dict.as_any())?,
            None => Value::Object(Target::object()),
        };
        let inner = reactive(&value)
            .into_proxy()
            .ok_or_else(|| PyTypeError::new_err("data cannot be observed"))?;
        Ok(Self { inner })
    }

    fn __getitem__(&self, py: Python<'_>, key: &Bound<'_, PyAny>) -> PyResult<PyObject> {
        let key = key_from_py(key)?;
        if !self.inner.raw().contains(&key) {
            return Err(PyKeyError::new_err(key.to_string()));
        }
        value_to_py(py, self.inner.get(key))
    }

    fn __setitem__(&self, key: &Bound<'_, PyAny>, value: &Bound<'_, PyAny>) -> PyResult<()> {
        self.inner.set(key_from_py(key)?, value_from_py(value)?)?;
        Ok(())
    }

    fn __delitem__(&self, key: &Bound<'_, PyAny>) -> PyResult<()> {
        let key = key_from_py(key)?;
        if !self.inner.delete(key.clone())? {
            return Err(PyKeyError::new_err(key.to_string()));
        }
        Ok(())
    }

    fn __contains__(&self, key: &Bound<'_, PyAny>) -> PyResult<bool> {
        Ok(self.inner.has(key_from_py(key)?))
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn keys(&self, py: Python<'_>) -> Vec<PyObject> {
        self.inner
            .keys()
            .into_iter()
            .map(|key| match key {
                Key::Bool(b) => b.into_py(py),
                Key::Int(i) => i.into_py(py),
                Key::Str(s) => s.into_py(py),
            })
            .collect()
    }

    #[getter]
    fn readonly(&self) -> bool {
        self.inner.is_readonly()
    }

    fn __repr__(&self) -> String {
        match Value::Proxy(self.inner.clone()).to_json() {
            Ok(json) => format!("Store({json})"),
            Err(_) => format!("Store(#{})", self.inner.id()),
        }
    }
}

/// Handle to an effect created from Python.
#[pyclass(name = "Effect")]
pub struct PyEffect {
    inner: Effect,
}

#[pymethods]
impl PyEffect {
    fn run(&self) {
        self.inner.run();
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    #[getter]
    fn active(&self) -> bool {
        self.inner.is_active()
    }

    #[getter]
    fn run_count(&self) -> usize {
        self.inner.run_count()
    }

    fn __repr__(&self) -> String {
        format!(
            "Effect(id={}, runs={}, active={})",
            self.inner.id(),
            self.inner.run_count(),
            self.inner.is_active()
        )
    }
}

/// Run `callback` now and again whenever a store value it read changes.
/// Exceptions raised by the callback are printed, not propagated.
#[pyfunction]
fn effect(callback: PyObject) -> PyEffect {
    let inner = Effect::new(move || {
        Python::with_gil(|py| {
            if let Err(err) = callback.call0(py) {
                err.print(py);
            }
        });
    });
    PyEffect { inner }
}

/// Python module definition.
///
/// This function is called by Python when importing the module.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyStore>()?;
    m.add_class::<PyEffect>()?;
    m.add_function(wrap_pyfunction!(effect, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
