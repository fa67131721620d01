pub mod calendar;
pub mod daily;
pub mod domain;
pub mod eligibility;
pub mod error;
pub mod insights;
pub mod memory;
pub mod ports;
pub mod priority;
pub mod selector;
pub mod service;

#[cfg(test)]
mod fixtures;

pub use daily::{
    DailyAnswer, DailyAssignmentBuilder, DailyItem, DailyProgress, DailyQuestionHistoryEntry,
    DailySet, DailyState, Supply,
};
pub use domain::{
    CefrLevel, DailyAssignment, LearningPreferences, PriorityScore, Question, QuestionContent,
    QuestionStatus, QuestionType, TopicPerformance, User, UserQuestionMetadata, UserResponse,
};
pub use eligibility::{EligibilityRules, NoQuestionsAvailable};
pub use error::{QuizError, QuizResult};
pub use insights::{
    HighPriorityQuestion, LearningProgress, PriorityDistribution, PriorityInsights,
};
pub use memory::InMemoryStore;
pub use ports::{PortError, PortResult, QuizStore, UserSettings};
pub use priority::{PriorityRecalculator, RecalculationSummary};
pub use selector::{Pool, SelectionMode};
pub use service::{
    AnswerResult, AnswerSubmission, NextQuestion, NextQuestionRequest, QuizConfig, QuizService,
    ServedQuestion,
};
