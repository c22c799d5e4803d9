use anyhow::Result;
use regex::{Captures, Regex};
use tracing::{info, warn};

use crate::ai::{create_provider, AIProvider, ProviderError};
use crate::config::{ScrubField, ScrubTerm, Settings};
use crate::models::{ApplicantProfile, ComposeMode, CoverLetterRequest};

/// Closing line used when the applicant did not give a name.
pub const NAME_PLACEHOLDER: &str = "[Your Name]";

const EMAIL_PLACEHOLDER: &str = "[Your Email]";
const PHONE_PLACEHOLDER: &str = "[Your Phone]";
const REDACTED_PLACEHOLDER: &str = "[Redacted]";

/// Placeholders left in generated text for the applicant to fill by hand.
const KEPT_PLACEHOLDERS: &[&str] = &[
    NAME_PLACEHOLDER,
    EMAIL_PLACEHOLDER,
    PHONE_PLACEHOLDER,
    REDACTED_PLACEHOLDER,
];

/// Where the returned letter text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LetterSource {
    Template,
    Generated,
    /// Generation was requested but failed; carries the reason.
    Fallback(String),
}

#[derive(Debug, Clone)]
pub struct Composition {
    pub text: String,
    pub source: LetterSource,
}

pub struct LetterComposer {
    provider: Option<Box<dyn AIProvider>>,
    scrubber: Scrubber,
    max_tokens: u32,
}

impl LetterComposer {
    pub fn new(
        provider: Option<Box<dyn AIProvider>>,
        scrub_terms: Vec<ScrubTerm>,
        max_tokens: u32,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            scrubber: Scrubber::new(scrub_terms)?,
            max_tokens,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            create_provider(&settings.generation),
            settings.scrub.terms.clone(),
            settings.generation.max_tokens,
        )
    }

    pub fn can_generate(&self) -> bool {
        self.provider.is_some()
    }

    /// Always returns usable letter text. A failed generation is logged and
    /// answered with the template letter.
    pub fn compose(&self, request: &CoverLetterRequest) -> String {
        let composition = self.compose_detailed(request);
        if let LetterSource::Fallback(reason) = &composition.source {
            warn!("AI generation failed, using template letter: {}", reason);
        }
        composition.text
    }

    pub fn compose_detailed(&self, request: &CoverLetterRequest) -> Composition {
        match request.mode {
            ComposeMode::Deterministic => Composition {
                text: deterministic_letter(request),
                source: LetterSource::Template,
            },
            ComposeMode::AiAssisted => match self.generate(request) {
                Ok(text) => Composition {
                    text,
                    source: LetterSource::Generated,
                },
                Err(e) => Composition {
                    text: deterministic_letter(request),
                    source: LetterSource::Fallback(e.to_string()),
                },
            },
        }
    }

    fn generate(&self, request: &CoverLetterRequest) -> Result<String, ProviderError> {
        let provider = self
            .provider
            .as_deref()
            .ok_or(ProviderError::MissingCredential)?;

        info!(
            model = provider.model_name(),
            title = %request.job_title,
            company = %request.company,
            "requesting generated cover letter"
        );
        let raw = provider.complete(&build_prompt(request), self.max_tokens)?;

        let cleaned = self.scrubber.scrub(&raw, request);
        if cleaned.trim().is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(cleaned)
    }
}

/// "A", "A and B", "A, B, and C".
pub fn join_skills(skills: &[String]) -> String {
    match skills {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{} and {}", a, b),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

/// Three-paragraph letter built only from the request; no external calls.
pub fn deterministic_letter(request: &CoverLetterRequest) -> String {
    let applicant = request.applicant.clone().unwrap_or_default();
    let title = request.job_title.trim();
    let company = request.company.trim();

    let position = match request.known_location() {
        Some(loc) => format!("the {} position at {} in {}", title, company, loc),
        None => format!("the {} position at {}", title, company),
    };

    let excitement = match applicant.experience {
        Some(band) => format!(
            "With {} professional experience behind me, I am excited about the opportunity",
            band.phrase()
        ),
        None => "I am excited about the opportunity".to_string(),
    };
    let opening = format!(
        "I am writing to express my interest in {}. {} to contribute to your team and to help {} achieve its goals.",
        position, excitement, company
    );

    let middle = if applicant.skills.is_empty() {
        format!(
            "Throughout my career I have taken pride in delivering reliable, well-crafted work and in \
             collaborating closely with colleagues. I am confident these strengths would allow me to \
             make a meaningful contribution in the {} role.",
            title
        )
    } else {
        format!(
            "My background in {} has prepared me to take on the responsibilities of this role. I take \
             pride in delivering reliable, well-crafted work and in collaborating closely with \
             colleagues, and I am confident I would make a meaningful contribution in the {} role.",
            join_skills(&applicant.skills),
            title
        )
    };

    let closing = format!(
        "I would welcome the opportunity to discuss how my skills and experience can benefit {}. \
         Thank you for considering my application, and I look forward to hearing from you.",
        company
    );

    let mut letter = format!(
        "Dear Hiring Manager,\n\n{}\n\n{}\n\n{}\n\nSincerely,\n{}",
        opening,
        middle,
        closing,
        applicant.name.as_deref().unwrap_or(NAME_PLACEHOLDER)
    );
    for contact in [&applicant.email, &applicant.phone].into_iter().flatten() {
        letter.push('\n');
        letter.push_str(contact);
    }
    letter
}

pub fn build_prompt(request: &CoverLetterRequest) -> String {
    let applicant = request.applicant.clone().unwrap_or_default();

    let mut prompt = format!(
        "Write a cover letter for the {} position at {}",
        request.job_title.trim(),
        request.company.trim()
    );
    if let Some(loc) = request.known_location() {
        prompt.push_str(&format!(" ({})", loc));
    }
    prompt.push_str(".\n\n");

    prompt.push_str(&applicant_section(&applicant));

    prompt.push_str(&format!(
        "\nGuidelines:\n\
         - Three short paragraphs in a professional tone, opening with \"Dear Hiring Manager,\".\n\
         - Use only the details given above. Do not invent names, contact details, employers, \
         technologies or achievements.\n\
         - Do not use bracketed placeholders other than {}.\n\
         - End with \"Sincerely,\" followed by {}.\n\
         - Return only the letter text.\n",
        NAME_PLACEHOLDER,
        applicant.name.as_deref().unwrap_or(NAME_PLACEHOLDER)
    ));
    prompt
}

fn applicant_section(applicant: &ApplicantProfile) -> String {
    let mut details = Vec::new();
    if let Some(name) = &applicant.name {
        details.push(format!("- Name: {}", name));
    }
    if let Some(band) = applicant.experience {
        details.push(format!("- Experience: {} ({} years)", band.phrase(), band.label()));
    }
    if !applicant.skills.is_empty() {
        details.push(format!("- Key skills: {}", join_skills(&applicant.skills)));
    }

    if details.is_empty() {
        "No applicant details were provided, so keep the letter generic.\n".to_string()
    } else {
        format!("About the applicant:\n{}\n", details.join("\n"))
    }
}

/// Suggested file name for a saved letter, e.g. `cover_letter_Acme_Corp_Backend_Engineer.txt`.
pub fn letter_file_name(company: &str, title: &str) -> String {
    let clean = |s: &str| {
        s.trim()
            .chars()
            .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
            .collect::<String>()
    };
    format!("cover_letter_{}_{}.txt", clean(company), clean(title))
}

/// Cleans generated text before anyone sees it.
///
/// Denylisted literals become placeholders and known placeholders are filled
/// from the request. Applicant-field placeholders with no value stay as the
/// canonical `[Your Name]`/`[Your Email]`/`[Your Phone]`, and `[Redacted]`
/// stays where it was written. A line is dropped only when it holds some
/// other placeholder that could not be filled, or a denylisted literal.
struct Scrubber {
    terms: Vec<ScrubTerm>,
    placeholder: Regex,
}

impl Scrubber {
    fn new(mut terms: Vec<ScrubTerm>) -> Result<Self> {
        terms.retain(|t| !t.term.trim().is_empty());
        // "Jane Roe" must be replaced before "Jane"
        terms.sort_by(|a, b| b.term.len().cmp(&a.term.len()));
        Ok(Self {
            terms,
            placeholder: Regex::new(r"\[[^\[\]\n]+\]")?,
        })
    }

    fn scrub(&self, raw: &str, request: &CoverLetterRequest) -> String {
        let mut text = raw.replace("\r\n", "\n");
        for term in &self.terms {
            text = text.replace(&term.term, field_placeholder(term.field));
        }

        let filled = self
            .placeholder
            .replace_all(&text, |caps: &Captures| {
                placeholder_value(&caps[0], request).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        let mut lines: Vec<&str> = Vec::new();
        for line in filled.lines() {
            let unresolved = self
                .placeholder
                .find_iter(line)
                .any(|m| !KEPT_PLACEHOLDERS.contains(&m.as_str()));
            if unresolved || self.terms.iter().any(|t| line.contains(&t.term)) {
                continue;
            }
            // collapse the blank runs left behind by dropped lines
            if line.trim().is_empty() && lines.last().is_none_or(|l| l.trim().is_empty()) {
                continue;
            }
            lines.push(line.trim_end());
        }
        lines.join("\n").trim().to_string()
    }
}

fn field_placeholder(field: ScrubField) -> &'static str {
    match field {
        ScrubField::Name => NAME_PLACEHOLDER,
        ScrubField::Email => EMAIL_PLACEHOLDER,
        ScrubField::Phone => PHONE_PLACEHOLDER,
        ScrubField::Other => REDACTED_PLACEHOLDER,
    }
}

fn placeholder_value(token: &str, request: &CoverLetterRequest) -> Option<String> {
    let key = token.trim_matches(|c: char| c == '[' || c == ']').trim().to_lowercase();
    let applicant = request.applicant.as_ref();
    let given = |field: Option<&String>| field.filter(|v| !v.trim().is_empty()).cloned();
    let value = match key.as_str() {
        "your name" | "your full name" | "name" => Some(
            given(applicant.and_then(|a| a.name.as_ref()))
                .unwrap_or_else(|| NAME_PLACEHOLDER.to_string()),
        ),
        "your email" | "your email address" | "email" => Some(
            given(applicant.and_then(|a| a.email.as_ref()))
                .unwrap_or_else(|| EMAIL_PLACEHOLDER.to_string()),
        ),
        "your phone" | "your phone number" | "phone" => Some(
            given(applicant.and_then(|a| a.phone.as_ref()))
                .unwrap_or_else(|| PHONE_PLACEHOLDER.to_string()),
        ),
        "company" | "company name" => Some(request.company.clone()),
        "position" | "position title" | "job title" | "role" => Some(request.job_title.clone()),
        "location" | "city" => request.known_location().map(str::to_string),
        "date" | "today's date" => Some(chrono::Local::now().format("%B %-d, %Y").to_string()),
        _ => None,
    };
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExperienceBand;

    struct FixedProvider {
        reply: String,
    }

    impl FixedProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
            }
        }
    }

    impl AIProvider for FixedProvider {
        fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ProviderError> {
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingProvider;

    impl AIProvider for FailingProvider {
        fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ProviderError> {
            Err(ProviderError::Status {
                status: reqwest::StatusCode::TOO_MANY_REQUESTS,
                body: "quota exceeded".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn request(mode: ComposeMode) -> CoverLetterRequest {
        CoverLetterRequest::new("Backend Engineer", "Acme Corp", mode)
    }

    fn applicant() -> ApplicantProfile {
        ApplicantProfile {
            name: Some("Sam Lee".to_string()),
            email: Some("sam@example.com".to_string()),
            phone: None,
            experience: Some(ExperienceBand::TwoToThree),
            skills: vec!["Rust".to_string(), "SQL".to_string(), "Kubernetes".to_string()],
        }
    }

    fn composer(provider: Option<Box<dyn AIProvider>>, terms: &[(&str, ScrubField)]) -> LetterComposer {
        let terms = terms
            .iter()
            .map(|(term, field)| ScrubTerm {
                term: term.to_string(),
                field: *field,
            })
            .collect();
        LetterComposer::new(provider, terms, 800).unwrap()
    }

    fn placeholders(text: &str) -> Vec<String> {
        Regex::new(r"\[[^\]]*\]")
            .unwrap()
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_deterministic_contains_job_and_only_name_placeholder() {
        let text = composer(None, &[]).compose(&request(ComposeMode::Deterministic));
        assert!(text.contains("Backend Engineer"));
        assert!(text.contains("Acme Corp"));
        assert_eq!(placeholders(&text), vec![NAME_PLACEHOLDER.to_string()]);
        assert!(text.trim_end().ends_with(NAME_PLACEHOLDER));
        // three paragraphs between salutation and sign-off
        assert_eq!(text.split("\n\n").count(), 5);
    }

    #[test]
    fn test_deterministic_is_pure() {
        let req = request(ComposeMode::Deterministic);
        assert_eq!(deterministic_letter(&req), deterministic_letter(&req));
    }

    #[test]
    fn test_deterministic_with_applicant_fields() {
        let mut req = request(ComposeMode::Deterministic);
        req.location = Some("Berlin".to_string());
        req.applicant = Some(applicant());
        let text = deterministic_letter(&req);

        assert!(text.contains("the Backend Engineer position at Acme Corp in Berlin"));
        assert!(text.contains("solid professional experience"));
        assert!(text.contains("Rust, SQL, and Kubernetes"));
        assert!(text.ends_with("Sincerely,\nSam Lee\nsam@example.com"));
        assert!(placeholders(&text).is_empty());
    }

    #[test]
    fn test_join_skills() {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        assert_eq!(join_skills(&[]), "");
        assert_eq!(join_skills(&s(&["Rust"])), "Rust");
        assert_eq!(join_skills(&s(&["Rust", "Go"])), "Rust and Go");
        assert_eq!(join_skills(&s(&["Rust", "Go", "SQL"])), "Rust, Go, and SQL");
    }

    #[test]
    fn test_ai_failure_falls_back_to_template() {
        let mut req = request(ComposeMode::AiAssisted);
        req.applicant = Some(applicant());

        let composer = composer(Some(Box::new(FailingProvider)), &[]);
        let result = composer.compose_detailed(&req);

        let mut deterministic = req.clone();
        deterministic.mode = ComposeMode::Deterministic;
        assert_eq!(result.text, composer.compose(&deterministic));
        assert!(matches!(result.source, LetterSource::Fallback(ref why) if why.contains("429")));
    }

    #[test]
    fn test_ai_without_provider_falls_back() {
        let composer = composer(None, &[]);
        assert!(!composer.can_generate());
        let result = composer.compose_detailed(&request(ComposeMode::AiAssisted));
        assert_eq!(result.text, deterministic_letter(&request(ComposeMode::Deterministic)));
        assert!(matches!(result.source, LetterSource::Fallback(_)));
    }

    #[test]
    fn test_ai_output_is_returned_and_prompt_has_fields() {
        let provider = FixedProvider::new("Dear Hiring Manager,\n\nGreat letter.\n\nSincerely,\nSam Lee");
        let composer = composer(Some(Box::new(provider)), &[]);
        let mut req = request(ComposeMode::AiAssisted);
        req.applicant = Some(applicant());

        let result = composer.compose_detailed(&req);
        assert_eq!(result.source, LetterSource::Generated);
        assert_eq!(result.text, "Dear Hiring Manager,\n\nGreat letter.\n\nSincerely,\nSam Lee");

        let prompt = build_prompt(&req);
        assert!(prompt.contains("Backend Engineer position at Acme Corp"));
        assert!(prompt.contains("- Name: Sam Lee"));
        assert!(prompt.contains("- Experience: solid (2-3 years)"));
        assert!(prompt.contains("- Key skills: Rust, SQL, and Kubernetes"));
        assert!(!prompt.contains("sam@example.com"));
    }

    #[test]
    fn test_prompt_without_applicant_is_generic() {
        let prompt = build_prompt(&request(ComposeMode::AiAssisted));
        assert!(prompt.contains("No applicant details were provided"));
        assert!(prompt.contains("followed by [Your Name]"));
    }

    #[test]
    fn test_scrub_replaces_denylisted_literals() {
        let reply = "Dear Hiring Manager,\n\n\
                     I am Jane Roe, an automation specialist.\n\n\
                     I built Project Nightjar last year.\n\
                     Reach me at jane.roe@live.example.\n\n\
                     Sincerely,\nJane Roe";
        let provider = FixedProvider::new(reply);
        let composer = composer(
            Some(Box::new(provider)),
            &[
                ("Jane", ScrubField::Name),
                ("Jane Roe", ScrubField::Name),
                ("jane.roe@live.example", ScrubField::Email),
                ("Project Nightjar", ScrubField::Other),
            ],
        );

        let mut req = request(ComposeMode::AiAssisted);
        req.applicant = Some(ApplicantProfile {
            name: Some("Sam Lee".to_string()),
            ..Default::default()
        });
        let result = composer.compose_detailed(&req);
        let text = result.text;

        assert_eq!(result.source, LetterSource::Generated);
        assert!(!text.contains("Jane"));
        assert!(!text.contains("jane.roe@live.example"));
        assert!(!text.contains("Project Nightjar"));
        assert!(text.contains("I am Sam Lee, an automation specialist."));
        assert!(text.contains("I built [Redacted] last year."));
        // no email supplied, so the generic field placeholder stays
        assert!(text.contains("Reach me at [Your Email]."));
        assert!(text.ends_with("Sincerely,\nSam Lee"));
    }

    #[test]
    fn test_scrubbed_name_keeps_the_sentence() {
        let reply = "Dear Hiring Manager,\n\n\
                     My name is Rada and I build reliable backend systems.\n\n\
                     Sincerely,\nRada";
        let composer = composer(
            Some(Box::new(FixedProvider::new(reply))),
            &[("Rada", ScrubField::Name)],
        );
        let result = composer.compose_detailed(&request(ComposeMode::AiAssisted));

        assert_eq!(result.source, LetterSource::Generated);
        assert_eq!(
            result.text,
            "Dear Hiring Manager,\n\n\
             My name is [Your Name] and I build reliable backend systems.\n\n\
             Sincerely,\n[Your Name]"
        );
    }

    #[test]
    fn test_name_placeholder_survives_without_applicant() {
        let reply = "Dear Hiring Manager,\n\nI am keen on this role.\n\nSincerely,\n[Your Name]";
        let composer = composer(Some(Box::new(FixedProvider::new(reply))), &[]);
        let text = composer.compose(&request(ComposeMode::AiAssisted));

        assert_eq!(text, reply);
        let template = deterministic_letter(&request(ComposeMode::Deterministic));
        assert!(text.ends_with(NAME_PLACEHOLDER) && template.ends_with(NAME_PLACEHOLDER));
    }

    #[test]
    fn test_scrub_drops_unfillable_placeholder_lines() {
        let reply = "[Your Full Name]\n[Your Address]\n[Date]\n\nDear Hiring Manager,\n\n\
                     I want the [Position] role at [Company Name].\n\
                     I admired [Recent Company Achievement].\n\n\n\nSincerely,\n[Your Name]";
        let composer = composer(Some(Box::new(FixedProvider::new(reply))), &[]);
        let text = composer.compose(&request(ComposeMode::AiAssisted));

        let mut lines = text.lines();
        // name alias normalized, address line dropped, date filled
        assert_eq!(lines.next(), Some(NAME_PLACEHOLDER));
        assert!(lines.next().unwrap().chars().any(|c| c.is_ascii_digit()));
        assert!(text.contains("I want the Backend Engineer role at Acme Corp."));
        assert!(!text.contains("[Your Address]"));
        assert!(!text.contains("admired"));
        assert!(!text.contains("\n\n\n"));
        assert!(text.ends_with("Sincerely,\n[Your Name]"));
        assert_eq!(placeholders(&text), vec![NAME_PLACEHOLDER.to_string(); 2]);
    }

    #[test]
    fn test_fully_scrubbed_reply_falls_back() {
        let composer = composer(
            Some(Box::new(FixedProvider::new("[Your Address]\n[Hiring Manager Name]"))),
            &[],
        );
        let result = composer.compose_detailed(&request(ComposeMode::AiAssisted));
        assert!(matches!(result.source, LetterSource::Fallback(_)));
        assert!(result.text.contains("Acme Corp"));
    }

    #[test]
    fn test_letter_file_name() {
        assert_eq!(
            letter_file_name("Acme Corp", "Backend / Platform Engineer"),
            "cover_letter_Acme_Corp_Backend___Platform_Engineer.txt"
        );
    }
}
