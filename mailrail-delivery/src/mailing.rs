use mailrail_ses::TransmissionRequest;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};

use crate::{Body, Mangler, Spec, ValidationFault, address::format_source};

/// A spec together with its compiled templates
///
/// Built once per processing attempt. A template is present only when its
/// source in the spec is non-empty.
#[derive(Debug)]
pub struct Mailing {
    spec: Spec,
    templates: Environment<'static>,
    has_text: bool,
    has_html: bool,
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|name| {
        if name == Body::Html.as_str() {
            AutoEscape::Html
        } else {
            AutoEscape::None
        }
    });
    env
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

impl Mailing {
    /// Compile the spec's templates
    ///
    /// # Errors
    /// A `TemplateSyntax` fault naming the body that failed to compile
    pub fn compile(spec: Spec) -> Result<Self, ValidationFault> {
        let mut templates = environment();

        for (body, source) in [(Body::Text, &spec.text), (Body::Html, &spec.html)] {
            if source.is_empty() {
                continue;
            }

            templates
                .add_template_owned(body.as_str(), source.clone())
                .map_err(|e| ValidationFault::TemplateSyntax {
                    body,
                    message: e.to_string(),
                })?;
        }

        Ok(Self {
            has_text: !spec.text.is_empty(),
            has_html: !spec.html.is_empty(),
            spec,
            templates,
        })
    }

    #[must_use]
    pub const fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Number of recipients
    #[must_use]
    pub fn len(&self) -> usize {
        self.spec.recipients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spec.recipients.is_empty()
    }

    fn render(&self, body: Body, index: usize) -> Result<Option<String>, ValidationFault> {
        let present = match body {
            Body::Text => self.has_text,
            Body::Html => self.has_html,
        };
        if !present {
            return Ok(None);
        }

        let render_fault = |e: minijinja::Error| ValidationFault::Render {
            recipient: index,
            body,
            message: e.to_string(),
        };

        let context = &self.spec.recipients[index].context;
        self.templates
            .get_template(body.as_str())
            .and_then(|template| template.render(context))
            .map(Some)
            .map_err(render_fault)
    }

    /// Resolve the request for recipient `index`
    ///
    /// Recipient-level overrides win over job-level fields when non-empty,
    /// and the destination is passed through the mangler.
    ///
    /// # Errors
    /// - `Render` if either template fails for this recipient's context
    /// - `InvalidRequest` if there is no such recipient, or the mangled
    ///   destination is empty
    pub fn resolve(
        &self,
        index: usize,
        mangler: &Mangler,
    ) -> Result<TransmissionRequest, ValidationFault> {
        let Some(recipient) = self.spec.recipients.get(index) else {
            return Err(ValidationFault::InvalidRequest {
                recipient: index,
                message: format!("job has only {} recipients", self.len()),
            });
        };

        let text = self.render(Body::Text, index)?;
        let html = self.render(Body::Html, index)?;

        let subject = non_empty(&recipient.subject).unwrap_or(&self.spec.subject);
        let from_name = non_empty(&recipient.from_name).unwrap_or(&self.spec.from_name);
        let from_addr = non_empty(&recipient.from_addr).unwrap_or(&self.spec.from_addr);

        let destination = mangler.mangle_address(&recipient.addr);
        if destination.is_empty() {
            return Err(ValidationFault::InvalidRequest {
                recipient: index,
                message: "destination address is empty".to_string(),
            });
        }

        Ok(TransmissionRequest {
            source: format_source(from_name, from_addr),
            destination: destination.to_string(),
            subject: subject.to_string(),
            text,
            html,
        })
    }

    /// Resolve every recipient without sending anything
    ///
    /// # Errors
    /// The first recipient that fails to resolve
    pub fn dry_run(&self, mangler: &Mangler) -> Result<(), ValidationFault> {
        (0..self.len()).try_for_each(|index| self.resolve(index, mangler).map(drop))
    }
}
