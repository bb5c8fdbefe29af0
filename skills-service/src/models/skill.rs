use serde::Serialize;
use std::fmt;

/// Chat skills exposed under `/{slug}/chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Skill {
    /// Archetype analyst: accepts text and images.
    CapivaraAnalista,
    /// Content writer: text only.
    CapivaraConteudo,
}

impl Skill {
    pub const ALL: [Skill; 2] = [Skill::CapivaraAnalista, Skill::CapivaraConteudo];

    pub fn slug(&self) -> &'static str {
        match self {
            Skill::CapivaraAnalista => "capivara-analista",
            Skill::CapivaraConteudo => "capivara-conteudo",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|skill| skill.slug() == slug)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Skill::CapivaraAnalista => "Capivara Analista",
            Skill::CapivaraConteudo => "Capivara do Conteúdo",
        }
    }

    pub fn accepts_images(&self) -> bool {
        matches!(self, Skill::CapivaraAnalista)
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
