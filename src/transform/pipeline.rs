//! Ordered execution of transformers with fail-fast validation.

use std::sync::Arc;

use crate::logger;

use super::{JsonBody, TransformContext, TransformError, Transformer};

#[derive(Clone)]
pub struct TransformPipeline {
    transformers: Vec<Arc<dyn Transformer>>,
}

impl TransformPipeline {
    pub fn new(transformers: Vec<Arc<dyn Transformer>>) -> Self {
        Self { transformers }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    /// Run every step in order against a private copy of `body`.
    ///
    /// Stops at the first step that errors or fails validation; no later
    /// step runs.
    pub fn execute(
        &self,
        body: &JsonBody,
        ctx: &mut TransformContext,
    ) -> Result<JsonBody, TransformError> {
        let mut data = body.clone();

        logger::debug(
            "pipeline",
            &format!(
                "Pipeline start: target={}, client={}, steps={}",
                ctx.target,
                ctx.client_type,
                self.transformers.len()
            ),
        );

        for transformer in &self.transformers {
            let step = transformer.name();
            data = match transformer.transform(data, ctx) {
                Ok(next) => next,
                Err(source) => {
                    logger::error(
                        "pipeline",
                        &format!("Transformer error: step={}, error={}", step, source),
                    );
                    return Err(TransformError::StepFailed { step, source });
                }
            };

            if !transformer.validate(&data) {
                logger::error(
                    "pipeline",
                    &format!("Transformer output failed validation: step={}", step),
                );
                return Err(TransformError::ValidationFailed { step });
            }

            logger::debug("pipeline", &format!("Transformer executed: {}", step));
        }

        logger::debug("pipeline", "Pipeline complete");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{StepError, TargetApi};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Append {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        valid: bool,
    }

    impl Transformer for Append {
        fn name(&self) -> &'static str {
            self.name
        }

        fn transform(
            &self,
            mut data: JsonBody,
            _ctx: &mut TransformContext,
        ) -> Result<JsonBody, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let trail = data
                .entry("trail")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = trail {
                items.push(json!(self.name));
            }
            Ok(data)
        }

        fn validate(&self, _data: &JsonBody) -> bool {
            self.valid
        }
    }

    struct Explode;

    impl Transformer for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn transform(
            &self,
            _data: JsonBody,
            _ctx: &mut TransformContext,
        ) -> Result<JsonBody, StepError> {
            Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "boom").into())
        }
    }

    fn step(name: &'static str, valid: bool) -> (Arc<dyn Transformer>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let t = Append {
            name,
            calls: Arc::clone(&calls),
            valid,
        };
        (Arc::new(t), calls)
    }

    fn ctx() -> TransformContext {
        TransformContext::new(TargetApi::OpenAI, "test", HashMap::new())
    }

    #[test]
    fn runs_steps_in_registration_order() {
        let (a, _) = step("a", true);
        let (b, _) = step("b", true);
        let (c, _) = step("c", true);
        let pipeline = TransformPipeline::new(vec![a, b, c]);

        let out = pipeline.execute(&JsonBody::new(), &mut ctx()).unwrap();
        assert_eq!(out["trail"], json!(["a", "b", "c"]));
        assert_eq!(pipeline.step_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn validation_failure_aborts_and_names_step() {
        let (a, a_calls) = step("a", true);
        let (b, b_calls) = step("b", false);
        let (c, c_calls) = step("c", true);
        let pipeline = TransformPipeline::new(vec![a, b, c]);

        let err = pipeline.execute(&JsonBody::new(), &mut ctx()).unwrap_err();
        assert!(matches!(err, TransformError::ValidationFailed { step: "b" }));
        assert_eq!(err.step(), "b");
        assert!(err.to_string().contains("b"));
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn step_error_is_wrapped_with_cause() {
        let (after, after_calls) = step("after", true);
        let pipeline = TransformPipeline::new(vec![Arc::new(Explode), after]);

        let err = pipeline.execute(&JsonBody::new(), &mut ctx()).unwrap_err();
        assert_eq!(err.step(), "explode");
        let source = std::error::Error::source(&err).expect("cause preserved");
        assert_eq!(source.to_string(), "boom");
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn caller_body_is_never_mutated() {
        let (a, _) = step("a", true);
        let pipeline = TransformPipeline::new(vec![a]);
        let mut original = JsonBody::new();
        original.insert("trail".to_string(), json!(["seed"]));

        let out = pipeline.execute(&original, &mut ctx()).unwrap();
        assert_eq!(out["trail"], json!(["seed", "a"]));
        assert_eq!(original["trail"], json!(["seed"]));
    }
}
