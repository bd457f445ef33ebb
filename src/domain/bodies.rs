//! Body artifacts produced by the server and their derived summaries.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Raw body data as handed over by the server for one query.
///
/// A handle is consumed when it becomes a [`Body`], so two caches can never
/// alias the same body instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyHandle {
    pub name: String,
    pub elements: Vec<[f32; 3]>,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    /// Bounds over the finite elements; `None` when there are none.
    fn of(elements: &[[f32; 3]]) -> Option<Self> {
        let mut finite = elements
            .iter()
            .filter(|element| element.iter().all(|value| value.is_finite()));
        let first = finite.next()?;
        let mut bounds = Bounds {
            min: *first,
            max: *first,
        };
        for element in finite {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(element[axis]);
                bounds.max[axis] = bounds.max[axis].max(element[axis]);
            }
        }
        Some(bounds)
    }
}

/// Shape and channel summary, computed once when a body enters a cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySummary {
    pub element_count: usize,
    pub bounds: Option<Bounds>,
    pub channels: Vec<String>,
}

/// Secondary representation used by viewers; only built under full caching.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub vertices: Vec<f32>,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    name: String,
    live: bool,
    summary: BodySummary,
    elements: Option<Vec<[f32; 3]>>,
    renderable: Option<Renderable>,
}

impl Body {
    /// Take ownership of a server handle. `live` records which cache kind produced it.
    pub fn from_handle(handle: BodyHandle, live: bool) -> Self {
        let summary = BodySummary {
            element_count: handle.elements.len(),
            bounds: Bounds::of(&handle.elements),
            channels: handle.channels,
        };
        Self {
            name: handle.name,
            live,
            summary,
            elements: Some(handle.elements),
            renderable: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn summary(&self) -> &BodySummary {
        &self.summary
    }

    pub fn elements(&self) -> Option<&[[f32; 3]]> {
        self.elements.as_deref()
    }

    pub fn renderable(&self) -> Option<&Renderable> {
        self.renderable.as_ref()
    }

    /// Drop heavy per-element data, keeping only the summary.
    pub fn discard_elements(&mut self) {
        self.elements = None;
        self.renderable = None;
    }

    /// Build the renderable representation from the element data.
    pub fn materialize_renderable(&mut self) -> Result<(), DomainError> {
        let elements = self.elements.as_ref().ok_or_else(|| {
            DomainError::invariant(format!(
                "body `{}` has no element data to render",
                self.name
            ))
        })?;

        if let Some(index) = elements
            .iter()
            .position(|element| element.iter().any(|value| !value.is_finite()))
        {
            return Err(DomainError::validation(format!(
                "body `{}` has a non-finite element at index {index}",
                self.name
            )));
        }

        let bounds = self.summary.bounds.ok_or_else(|| {
            DomainError::validation(format!("body `{}` has no elements to render", self.name))
        })?;

        let vertices = elements.iter().flat_map(|element| element.iter().copied()).collect();
        self.renderable = Some(Renderable { vertices, bounds });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str, elements: Vec<[f32; 3]>) -> BodyHandle {
        BodyHandle {
            name: name.to_string(),
            elements,
            channels: vec!["P".to_string()],
        }
    }

    #[test]
    fn summary_is_computed_at_construction() {
        let body = Body::from_handle(handle("b", vec![[0.0, 1.0, 2.0], [-1.0, 4.0, 0.5]]), true);
        assert!(body.is_live());
        assert_eq!(body.summary().element_count, 2);
        let bounds = body.summary().bounds.expect("bounds");
        assert_eq!(bounds.min, [-1.0, 1.0, 0.5]);
        assert_eq!(bounds.max, [0.0, 4.0, 2.0]);
    }

    #[test]
    fn discarding_elements_keeps_summary() {
        let mut body = Body::from_handle(handle("b", vec![[1.0, 1.0, 1.0]]), false);
        let summary = body.summary().clone();
        body.discard_elements();
        assert!(body.elements().is_none());
        assert_eq!(body.summary(), &summary);
        assert!(body.materialize_renderable().is_err());
    }

    #[test]
    fn non_finite_elements_fail_materialization() {
        let mut body = Body::from_handle(handle("b", vec![[1.0, f32::NAN, 0.0]]), true);
        let err = body.materialize_renderable().expect_err("nan must fail");
        assert!(matches!(err, DomainError::Validation { .. }));
        assert!(body.renderable().is_none());
    }

    #[test]
    fn renderable_flattens_elements() {
        let mut body = Body::from_handle(handle("b", vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]), true);
        body.materialize_renderable().expect("renderable");
        let renderable = body.renderable().expect("present");
        assert_eq!(renderable.vertices, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
