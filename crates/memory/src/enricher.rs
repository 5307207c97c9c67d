//! Context enrichment: a plain-text summary of what a session remembers.
//!
//! The block is appended to the instruction preamble of every completion
//! request so the model can greet returning users and reuse known details.
//! Numeric backend ids never appear in it; entities are shown by their
//! human-facing code.

use filachat_config::DomainConfig;
use filachat_core::Session;

const HEADER: &str = "\n\nCONTEXTO DA SESSÃO:\n";
const RECENT_ENTITIES: usize = 3;

/// Renders a [`Session`] into the enrichment block.
#[derive(Debug, Clone)]
pub struct ContextEnricher {
    provider_label: String,
    location_label: String,
    service_label: String,
}

impl ContextEnricher {
    pub fn new(
        provider_label: impl Into<String>,
        location_label: impl Into<String>,
        service_label: impl Into<String>,
    ) -> Self {
        Self {
            provider_label: provider_label.into(),
            location_label: location_label.into(),
            service_label: service_label.into(),
        }
    }

    pub fn from_domain(domain: &DomainConfig) -> Self {
        Self::new(
            &domain.provider_label,
            &domain.location_label,
            &domain.service_label,
        )
    }

    /// Render the enrichment block, or the empty string when there is nothing to say.
    pub fn render(&self, session: &Session) -> String {
        if !session.has_memory() {
            return String::new();
        }

        let mut lines: Vec<String> = Vec::new();
        let profile = &session.profile;

        if let Some(name) = &profile.name {
            lines.push(format!("Nome do usuário: {name}"));
        }
        if let Some(phone) = &profile.phone {
            lines.push(format!("Telefone: {phone}"));
        }
        if let Some(email) = &profile.email {
            lines.push(format!("Email: {email}"));
        }
        if !profile.is_empty() {
            lines.push(format!("Serviço: {}", self.service_label));
        }

        if session.default_device.is_some() {
            lines.push(format!(
                "Terminal padrão configurado ({} - {})",
                self.provider_label, self.location_label
            ));
        }

        let recent = session.recent_entities(RECENT_ENTITIES);
        if !recent.is_empty() {
            let rendered: Vec<String> = recent
                .iter()
                .map(|e| {
                    let category = if e.category.is_empty() {
                        &self.service_label
                    } else {
                        &e.category
                    };
                    if e.code.is_empty() {
                        category.clone()
                    } else {
                        format!("{category} ({})", e.code)
                    }
                })
                .collect();
            lines.push(format!("Atendimentos recentes: {}", rendered.join(", ")));
        }

        if let Some(summary) = session.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            lines.push(format!("Contexto anterior: {summary}"));
        }

        if session.interaction_count > 1 {
            lines.push(format!(
                "Esta é a {}ª interação do usuário",
                session.interaction_count
            ));
        }

        if lines.is_empty() {
            String::new()
        } else {
            format!("{HEADER}{}", lines.join("\n"))
        }
    }
}

impl Default for ContextEnricher {
    fn default() -> Self {
        Self::from_domain(&DomainConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filachat_core::{CompletedEntity, DefaultDevice, ProfilePatch, SessionId};

    fn session() -> Session {
        Session::new(SessionId::from("enrich-1"))
    }

    #[test]
    fn fresh_session_renders_nothing() {
        let enricher = ContextEnricher::default();
        let mut s = session();
        s.increment_interactions();
        assert_eq!(enricher.render(&s), "");
    }

    #[test]
    fn phone_only_profile() {
        let enricher = ContextEnricher::default();
        let mut s = session();
        s.merge_profile(ProfilePatch {
            phone: Some("11987654321".into()),
            ..Default::default()
        });
        let block = enricher.render(&s);
        assert!(block.starts_with("\n\nCONTEXTO DA SESSÃO:\n"));
        assert!(block.contains("Telefone: 11987654321"));
        assert!(block.contains("Serviço: FISIOTERAPIA"));
        assert!(!block.contains("Nome do usuário"));
    }

    #[test]
    fn full_context_in_order() {
        let enricher = ContextEnricher::default();
        let mut s = session();
        s.merge_profile(ProfilePatch {
            name: Some("Maria Silva".into()),
            phone: Some("11987654321".into()),
            email: Some("maria@example.com".into()),
        });
        s.set_default_device(DefaultDevice {
            access_key: "d6779a60360d455b9af96c1b68e066c5".into(),
            provider_id: 11,
            location_id: 11,
        });
        s.set_summary("Usuário perguntou sobre horários");
        s.increment_interactions();
        s.increment_interactions();
        s.increment_interactions();

        let block = enricher.render(&s);
        let expected = "\n\nCONTEXTO DA SESSÃO:\n\
            Nome do usuário: Maria Silva\n\
            Telefone: 11987654321\n\
            Email: maria@example.com\n\
            Serviço: FISIOTERAPIA\n\
            Terminal padrão configurado (Filazero - AGENCIA-001)\n\
            Contexto anterior: Usuário perguntou sobre horários\n\
            Esta é a 3ª interação do usuário";
        assert_eq!(block, expected);
        assert!(!block.contains("d6779a60"));
    }

    #[test]
    fn recent_entities_show_codes_not_ids() {
        let enricher = ContextEnricher::default();
        let mut s = session();
        for (id, code) in [(9001, "AAAAA"), (9002, "BBBBB"), (9003, ""), (9004, "DDDDD")] {
            s.record_entity(CompletedEntity::new(id, code, "FISIOTERAPIA"), 10);
        }
        let block = enricher.render(&s);
        assert!(block.contains(
            "Atendimentos recentes: FISIOTERAPIA (BBBBB), FISIOTERAPIA, FISIOTERAPIA (DDDDD)"
        ));
        assert!(!block.contains("AAAAA"));
        assert!(!block.contains("900"));
    }

    #[test]
    fn single_interaction_not_mentioned() {
        let enricher = ContextEnricher::default();
        let mut s = session();
        s.set_summary("resumo");
        s.increment_interactions();
        assert!(!enricher.render(&s).contains("interação"));
    }
}
