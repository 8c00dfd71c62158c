//! Natural-language instructions handed to the agent.

use super::{ApplicantProfile, SearchQuery};

/// At most this many skills are listed in an apply goal.
const MAX_GOAL_SKILLS: usize = 8;

pub fn build_search_goal(query: &SearchQuery) -> String {
    let arrangement = if query.remote_ok {
        "Remote OK"
    } else {
        "On-site only"
    };
    let salary = query
        .min_salary
        .map(|s| format!("\n- Minimum salary: ${}", group_thousands(s)))
        .unwrap_or_default();

    format!(
        "Search for job openings matching these criteria:\n\
         - Job titles: {query}\n\
         - Locations: {location}\n\
         - Work arrangement: {arrangement}{salary}\n\
         \n\
         For each job found, extract and return as a JSON array of objects with fields:\n  \
         title, company, location, application_url, description (1 sentence), posted_date\n\
         \n\
         Find up to {max} relevant positions. Return ONLY a valid JSON array.",
        query = query.query,
        location = query.location,
        max = query.max_results,
    )
}

pub fn build_apply_goal(profile: &ApplicantProfile, title: &str, company: &str) -> String {
    let skills = profile
        .skills
        .iter()
        .take(MAX_GOAL_SKILLS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let linkedin = profile
        .linkedin_url
        .as_deref()
        .map(|u| format!("\n- LinkedIn: {}", u))
        .unwrap_or_default();
    let github = profile
        .github_url
        .as_deref()
        .map(|u| format!("\n- GitHub: {}", u))
        .unwrap_or_default();

    format!(
        "Apply for the {title} position at {company}.\n\
         \n\
         Fill the application form with these details:\n\
         - Full Name: {name}\n\
         - Email: {email}\n\
         - Phone: {phone}\n\
         - Location: {location}{linkedin}{github}\n\
         - Years of Experience: {years}\n\
         - Current/Most Recent Role: {role} at {role_company}\n\
         - Key Skills: {skills}\n\
         \n\
         For cover letter or \"tell us about yourself\" fields, use:\n\
         \"{summary}\"\n\
         \n\
         Education: {education}\n\
         \n\
         Steps:\n\
         1. Navigate to the application form\n\
         2. Fill ALL required fields with the data above\n\
         3. Leave optional unlisted fields blank\n\
         4. Review and click Submit/Apply\n\
         5. Return JSON: {{ \"success\": bool, \"confirmation_id\": \"...\", \"message\": \"...\" }}\n\
         \n\
         STOP and report if you encounter a CAPTCHA or mandatory login wall.",
        name = profile.full_name,
        email = profile.email,
        phone = profile.phone,
        location = profile.location,
        years = profile.years_experience,
        role = profile.most_recent_role,
        role_company = profile.most_recent_company,
        summary = profile.summary,
        education = profile.education,
    )
}

fn group_thousands(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
