use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ModeratorId);
id_newtype!(PollId);
id_newtype!(QuestionId);
id_newtype!(AnswerId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id_moderator: ModeratorId,
    pub id_poll: PollId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id_moderator: ModeratorId,
    pub id_poll: PollId,
    pub id_question: QuestionId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Ordering key used for next/previous navigation. Ties are not defined;
    /// the first match wins.
    pub index_in_poll: f64,
    /// Minimum number of checked answers before the vote is considered
    /// complete. 0 means no lower bound.
    pub answer_min: u32,
    /// Maximum number of answers that may be checked at once. 0 means no
    /// upper bound.
    pub answer_max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id_moderator: ModeratorId,
    pub id_poll: PollId,
    pub id_question: QuestionId,
    pub id_answer: AnswerId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "isChecked")]
    pub checked: bool,
}

impl Answer {
    pub fn toggle(&mut self) {
        self.checked = !self.checked;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_uses_backend_field_names() {
        let answer = Answer {
            id_moderator: ModeratorId(1),
            id_poll: PollId(2),
            id_question: QuestionId(3),
            id_answer: AnswerId(4),
            title: "Rust".to_string(),
            description: None,
            checked: true,
        };

        let json = serde_json::to_value(&answer).expect("serialize");
        assert_eq!(json["idAnswer"], 4);
        assert_eq!(json["isChecked"], true);
        assert!(json.get("description").is_none());
    }

    #[test]
    fn question_round_trips_through_backend_json() {
        let raw = r#"{
            "idModerator": 1,
            "idPoll": 2,
            "idQuestion": 7,
            "title": "Favourite language?",
            "indexInPoll": 1.5,
            "answerMin": 0,
            "answerMax": 2
        }"#;

        let question: Question = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(question.id_question, QuestionId(7));
        assert_eq!(question.index_in_poll, 1.5);
        assert_eq!(question.answer_max, 2);
        assert_eq!(question.details, None);
    }
}
