//! Workflow templates: named factories that turn caller params into a DAG.
//!
//! Missing params never fail construction; they bind as empty strings and
//! the affected steps fail (or degrade) when they run.

use std::collections::HashMap;
use std::sync::Arc;

use super::model::Workflow;
use super::operations::{
    AnalysisOperation, CompanyProfileOperation, CrossReferenceOperation, KeyPointsOperation,
    SearchOperation, SentimentOperation, SummaryOperation, SynthesizeOperation,
};
use super::step::WorkflowStep;
use crate::error::WorkflowError;
use crate::tools::SearchType;

/// Builds a workflow from `(workflow_id, params)`.
pub type TemplateFactory = fn(&str, &HashMap<String, String>) -> Workflow;

/// Template name -> factory. Keeps registration order.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<(String, TemplateFactory)>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the five built-in templates.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("comprehensive_search", comprehensive_search);
        registry.register("multi_source_analysis", multi_source_analysis);
        registry.register("research_report", research_report);
        registry.register("competitive_analysis", competitive_analysis);
        registry.register("trend_analysis", trend_analysis);
        registry
    }

    /// Add a template, replacing any existing one with the same name.
    pub fn register(&mut self, name: impl Into<String>, factory: TemplateFactory) {
        let name = name.into();
        match self.templates.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory,
            None => self.templates.push((name, factory)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.templates.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Build a workflow. Fails for an unknown name or a factory that repeats a step id.
    pub fn build(
        &self,
        name: &str,
        workflow_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<Workflow, WorkflowError> {
        let (_, factory) = self
            .templates
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| WorkflowError::UnknownTemplate(name.to_string()))?;

        let workflow = factory(workflow_id, params);
        if let Some(step_id) = workflow.duplicate_step_ids().first() {
            return Err(WorkflowError::DuplicateStep(step_id.to_string()));
        }
        Ok(workflow)
    }
}

fn param(params: &HashMap<String, String>, key: &str) -> String {
    params.get(key).cloned().unwrap_or_default()
}

// =============================================================================
// BUILT-IN TEMPLATES
// =============================================================================
/// Three parallel searches -> synthesis -> summary.
pub fn comprehensive_search(workflow_id: &str, params: &HashMap<String, String>) -> Workflow {
    let query = param(params, "query");
    let search = |id: &str, name: &str, search_type| {
        WorkflowStep::new(id, name, Arc::new(SearchOperation::new("{query}", search_type)))
            .with_param("query", query.clone())
    };

    Workflow::new(workflow_id, "Comprehensive Search Analysis")
        .with_step(search("search_general", "General search", SearchType::General))
        .with_step(search("search_news", "News search", SearchType::News))
        .with_step(search("search_academic", "Academic search", SearchType::Academic))
        .with_step(
            WorkflowStep::new(
                "synthesize_results",
                "Synthesize results",
                Arc::new(SynthesizeOperation::new(vec![
                    "search_general",
                    "search_news",
                    "search_academic",
                ])),
            )
            .with_param("query", query.clone())
            .depends_on(["search_general", "search_news", "search_academic"]),
        )
        .with_step(
            WorkflowStep::new(
                "generate_summary",
                "Generate summary",
                Arc::new(SummaryOperation::new("synthesize_results")),
            )
            .depends_on(["synthesize_results"]),
        )
}

/// collect -> {sentiment, key points} -> cross reference -> report.
pub fn multi_source_analysis(workflow_id: &str, params: &HashMap<String, String>) -> Workflow {
    let topic = param(params, "topic");

    Workflow::new(workflow_id, "Multi-Source Analysis")
        .with_step(
            WorkflowStep::new(
                "collect_sources",
                "Collect sources",
                Arc::new(SearchOperation::new("{topic}", SearchType::General)),
            )
            .with_param("topic", topic.clone()),
        )
        .with_step(
            WorkflowStep::new(
                "analyze_sentiment",
                "Sentiment analysis",
                Arc::new(SentimentOperation::new("collect_sources")),
            )
            .depends_on(["collect_sources"]),
        )
        .with_step(
            WorkflowStep::new(
                "extract_key_points",
                "Extract key points",
                Arc::new(KeyPointsOperation::new("collect_sources", 5)),
            )
            .depends_on(["collect_sources"]),
        )
        .with_step(
            WorkflowStep::new(
                "cross_reference",
                "Cross reference",
                Arc::new(CrossReferenceOperation::new(vec![
                    "collect_sources",
                    "extract_key_points",
                ])),
            )
            .depends_on(["analyze_sentiment", "extract_key_points"]),
        )
        .with_step(
            WorkflowStep::new(
                "generate_report",
                "Generate report",
                Arc::new(AnalysisOperation::new(
                    "Analysis report",
                    "{topic}",
                    vec![
                        "collect_sources",
                        "analyze_sentiment",
                        "extract_key_points",
                        "cross_reference",
                    ],
                )),
            )
            .with_param("topic", topic)
            .depends_on(["cross_reference"]),
        )
}

/// {literature, trends, experts}; trends -> market; all four -> report.
pub fn research_report(workflow_id: &str, params: &HashMap<String, String>) -> Workflow {
    let topic = param(params, "topic");

    Workflow::new(workflow_id, "Research Report")
        .with_step(
            WorkflowStep::new(
                "literature_review",
                "Literature review",
                Arc::new(SearchOperation::new("{topic}", SearchType::Academic)),
            )
            .with_param("topic", topic.clone()),
        )
        .with_step(
            WorkflowStep::new(
                "current_trends",
                "Current trends",
                Arc::new(SearchOperation::new("{topic} trends", SearchType::News)),
            )
            .with_param("topic", topic.clone()),
        )
        .with_step(
            WorkflowStep::new(
                "expert_opinions",
                "Expert opinions",
                Arc::new(SearchOperation::new("{topic} expert opinion", SearchType::Qa)),
            )
            .with_param("topic", topic.clone()),
        )
        .with_step(
            WorkflowStep::new(
                "market_analysis",
                "Market analysis",
                Arc::new(AnalysisOperation::new(
                    "Market analysis",
                    "{topic}",
                    vec!["current_trends"],
                )),
            )
            .with_param("topic", topic.clone())
            .depends_on(["current_trends"]),
        )
        .with_step(
            WorkflowStep::new(
                "compile_report",
                "Compile report",
                Arc::new(AnalysisOperation::new(
                    "Research report",
                    "{topic}",
                    vec![
                        "literature_review",
                        "current_trends",
                        "expert_opinions",
                        "market_analysis",
                    ],
                )),
            )
            .with_param("topic", topic)
            .depends_on([
                "literature_review",
                "current_trends",
                "expert_opinions",
                "market_analysis",
            ]),
        )
}

/// {profile, competitors} -> market position -> SWOT -> recommendations.
pub fn competitive_analysis(workflow_id: &str, params: &HashMap<String, String>) -> Workflow {
    let company = param(params, "company");
    let industry = param(params, "industry");

    Workflow::new(workflow_id, "Competitive Analysis Report")
        .with_step(
            WorkflowStep::new(
                "company_profile",
                "Company profile",
                Arc::new(CompanyProfileOperation),
            )
            .with_param("company", company.clone()),
        )
        .with_step(
            WorkflowStep::new(
                "competitor_identification",
                "Competitor identification",
                Arc::new(SearchOperation::new(
                    "{company} {industry} competitors",
                    SearchType::General,
                )),
            )
            .with_param("company", company.clone())
            .with_param("industry", industry),
        )
        .with_step(
            WorkflowStep::new(
                "market_position",
                "Market position",
                Arc::new(AnalysisOperation::new(
                    "Market position",
                    "{company}",
                    vec!["company_profile", "competitor_identification"],
                )),
            )
            .with_param("company", company.clone())
            .depends_on(["company_profile", "competitor_identification"]),
        )
        .with_step(
            WorkflowStep::new(
                "swot_analysis",
                "SWOT analysis",
                Arc::new(AnalysisOperation::new(
                    "SWOT analysis",
                    "{company}",
                    vec!["market_position", "competitor_identification"],
                )),
            )
            .with_param("company", company.clone())
            .depends_on(["market_position"]),
        )
        .with_step(
            WorkflowStep::new(
                "strategic_recommendations",
                "Strategic recommendations",
                Arc::new(AnalysisOperation::new(
                    "Strategic recommendations",
                    "{company}",
                    vec!["swot_analysis", "market_position"],
                )),
            )
            .with_param("company", company)
            .depends_on(["swot_analysis"]),
        )
}

/// historical -> patterns; {patterns, emerging} -> correlation -> projection.
pub fn trend_analysis(workflow_id: &str, params: &HashMap<String, String>) -> Workflow {
    let domain = param(params, "domain");
    let timeframe = params
        .get("timeframe")
        .filter(|t| !t.is_empty())
        .cloned()
        .unwrap_or_else(|| "1year".to_string());

    Workflow::new(workflow_id, "Trend Analysis Report")
        .with_step(
            WorkflowStep::new(
                "historical_data",
                "Historical data",
                Arc::new(SearchOperation::new(
                    "{domain} history {timeframe}",
                    SearchType::News,
                )),
            )
            .with_param("domain", domain.clone())
            .with_param("timeframe", timeframe),
        )
        .with_step(
            WorkflowStep::new(
                "pattern_recognition",
                "Pattern recognition",
                Arc::new(AnalysisOperation::new(
                    "Pattern recognition",
                    "{domain}",
                    vec!["historical_data"],
                )),
            )
            .with_param("domain", domain.clone())
            .depends_on(["historical_data"]),
        )
        .with_step(
            WorkflowStep::new(
                "emerging_trends",
                "Emerging trends",
                Arc::new(SearchOperation::new("{domain} emerging trends", SearchType::News)),
            )
            .with_param("domain", domain.clone()),
        )
        .with_step(
            WorkflowStep::new(
                "trend_correlation",
                "Trend correlation",
                Arc::new(CrossReferenceOperation::new(vec![
                    "historical_data",
                    "emerging_trends",
                ])),
            )
            .depends_on(["pattern_recognition", "emerging_trends"]),
        )
        .with_step(
            WorkflowStep::new(
                "future_projection",
                "Future projection",
                Arc::new(AnalysisOperation::new(
                    "Future projection",
                    "{domain}",
                    vec!["pattern_recognition", "emerging_trends", "trend_correlation"],
                )),
            )
            .with_param("domain", domain)
            .depends_on(["trend_correlation"]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(workflow: &Workflow, step_id: &str) -> Vec<String> {
        workflow.step(step_id).unwrap().dependencies.clone()
    }

    #[test]
    fn test_default_template_names() {
        assert_eq!(
            TemplateRegistry::with_defaults().names(),
            vec![
                "comprehensive_search",
                "multi_source_analysis",
                "research_report",
                "competitive_analysis",
                "trend_analysis",
            ]
        );
    }

    #[test]
    fn test_unknown_template() {
        let err = TemplateRegistry::with_defaults()
            .build("does_not_exist", "wf", &HashMap::new())
            .unwrap_err();
        assert_eq!(err, WorkflowError::UnknownTemplate("does_not_exist".into()));
    }

    #[test]
    fn test_every_template_is_well_formed() {
        let registry = TemplateRegistry::with_defaults();
        for name in registry.names() {
            let workflow = registry.build(&name, "wf", &HashMap::new()).unwrap();
            assert_eq!(workflow.steps.len(), 5, "{name}");
            assert!(workflow.dangling_dependencies().is_empty(), "{name}");
            assert!(workflow.duplicate_step_ids().is_empty(), "{name}");
            assert_eq!(workflow.id, "wf");
        }
    }

    #[test]
    fn test_comprehensive_search_shape() {
        let params = HashMap::from([("query".to_string(), "X".to_string())]);
        let workflow = comprehensive_search("wf", &params);
        let ids: Vec<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "search_general",
                "search_news",
                "search_academic",
                "synthesize_results",
                "generate_summary",
            ]
        );
        assert!(deps(&workflow, "search_news").is_empty());
        assert_eq!(deps(&workflow, "synthesize_results").len(), 3);
        assert_eq!(deps(&workflow, "generate_summary"), vec!["synthesize_results"]);
        assert_eq!(workflow.step("search_general").unwrap().params["query"], "X");
    }

    #[test]
    fn test_trend_analysis_defaults_timeframe() {
        let workflow = trend_analysis("wf", &HashMap::new());
        let step = workflow.step("historical_data").unwrap();
        assert_eq!(step.params["timeframe"], "1year");
        assert_eq!(step.params["domain"], "");
        assert_eq!(
            deps(&workflow, "trend_correlation"),
            vec!["pattern_recognition", "emerging_trends"]
        );
    }

    #[test]
    fn test_register_replaces() {
        fn empty(id: &str, _params: &HashMap<String, String>) -> Workflow {
            Workflow::new(id, "Empty")
        }
        let mut registry = TemplateRegistry::with_defaults();
        registry.register("trend_analysis", empty);
        registry.register("empty", empty);
        assert_eq!(registry.names().len(), 6);
        assert!(registry.build("trend_analysis", "wf", &HashMap::new()).unwrap().steps.is_empty());
        assert!(registry.contains("empty"));
    }

    #[test]
    fn test_build_rejects_repeated_step_ids() {
        fn repeated(id: &str, params: &HashMap<String, String>) -> Workflow {
            let mut workflow = comprehensive_search(id, params);
            let copy = workflow.steps[0].clone();
            workflow.steps.push(copy);
            workflow
        }
        let mut registry = TemplateRegistry::new();
        registry.register("repeated", repeated);

        let err = registry.build("repeated", "wf", &HashMap::new()).unwrap_err();
        assert_eq!(err, WorkflowError::DuplicateStep("search_general".into()));
    }
}
