use axum::{extract::State, Json};
use serde::Serialize;

use crate::models::Skill;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SkillSummary {
    pub slug: &'static str,
    pub name: &'static str,
    pub accepts_images: bool,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct SkillList {
    pub success: bool,
    pub skills: Vec<SkillSummary>,
}

pub async fn list_skills(State(state): State<AppState>) -> Json<SkillList> {
    let skills = Skill::ALL
        .into_iter()
        .map(|skill| SkillSummary {
            slug: skill.slug(),
            name: skill.display_name(),
            accepts_images: skill.accepts_images(),
            available: state
                .skills
                .get(skill)
                .is_some_and(|orchestrator| orchestrator.is_configured()),
        })
        .collect();

    Json(SkillList {
        success: true,
        skills,
    })
}
