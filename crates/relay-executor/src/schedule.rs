//! Daily-schedule prompt composed from an external task list.

use relay_core::traits::{TaskItem, TaskList, TaskListProvider, TaskProviderError, TaskStatus};

/// Instructions placed before the task lists when none are configured.
pub const DEFAULT_PREAMBLE: &str =
    "Plan my day as an hourly schedule. Use only the open tasks below and keep it short";

const EXAMPLE: &str = "Example of a scheduled task in the template \"14:00 [humor]\": \
                       \"Humor: watch a video\".";

/// Build the prompt from every task list of `provider`.
///
/// # Errors
/// Returns error if listing task lists or any of their tasks fails.
pub async fn build_prompt<P>(provider: &P, preamble: &str) -> Result<String, TaskProviderError>
where
    P: TaskListProvider + ?Sized,
{
    let lists = provider.list_task_lists().await?;
    let mut collected = Vec::with_capacity(lists.len());
    for list in lists {
        let tasks = provider.list_tasks(&list.id).await?;
        collected.push((list, tasks));
    }
    tracing::debug!(lists = collected.len(), "collected task lists");
    Ok(compose(preamble, &collected))
}

/// Compose the prompt text from already fetched lists.
///
/// Completed tasks are left out; lists without open tasks are skipped.
#[must_use]
pub fn compose(preamble: &str, lists: &[(TaskList, Vec<TaskItem>)]) -> String {
    let sections: Vec<String> = lists
        .iter()
        .filter_map(|(list, tasks)| {
            let open: Vec<&TaskItem> = tasks
                .iter()
                .filter(|t| t.status != TaskStatus::Completed)
                .collect();
            if open.is_empty() {
                return None;
            }
            let mut section = format!("[{}]:\n", list.title);
            for task in open {
                section.push_str("- ");
                section.push_str(&task.title);
                section.push('\n');
            }
            Some(section)
        })
        .collect();

    format!(
        "{preamble}:\n{EXAMPLE}\nTasks to include in the schedule:\n{}",
        sections.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;

    fn task(title: &str, status: TaskStatus) -> TaskItem {
        TaskItem {
            title: title.to_string(),
            status,
        }
    }

    fn list(id: &str, title: &str) -> TaskList {
        TaskList {
            id: id.to_string(),
            title: title.to_string(),
        }
    }

    struct FixedTasks {
        lists: Vec<TaskList>,
        tasks: HashMap<String, Vec<TaskItem>>,
    }

    #[async_trait]
    impl TaskListProvider for FixedTasks {
        async fn list_task_lists(&self) -> Result<Vec<TaskList>, TaskProviderError> {
            Ok(self.lists.clone())
        }

        async fn list_tasks(&self, list_id: &str) -> Result<Vec<TaskItem>, TaskProviderError> {
            self.tasks
                .get(list_id)
                .cloned()
                .ok_or_else(|| TaskProviderError::Request(format!("unknown list {list_id}")))
        }
    }

    #[test]
    fn test_compose_lists_open_tasks_only() {
        let prompt = compose(
            "Plan",
            &[
                (
                    list("1", "Work"),
                    vec![
                        task("Write report", TaskStatus::NeedsAction),
                        task("Send invoice", TaskStatus::Completed),
                    ],
                ),
                (list("2", "Done"), vec![task("Old", TaskStatus::Completed)]),
                (list("3", "Empty"), Vec::new()),
                (list("4", "Home"), vec![task("Water plants", TaskStatus::NeedsAction)]),
            ],
        );

        assert!(prompt.starts_with("Plan:\n"));
        assert!(prompt.contains("[Work]:\n- Write report\n"));
        assert!(prompt.contains("[Home]:\n- Water plants\n"));
        assert!(!prompt.contains("Send invoice"));
        assert!(!prompt.contains("[Done]"));
        assert!(!prompt.contains("[Empty]"));
        assert!(prompt.find("[Work]") < prompt.find("[Home]"));
    }

    #[tokio::test]
    async fn test_build_prompt_queries_every_list() {
        let provider = FixedTasks {
            lists: vec![list("a", "Errands")],
            tasks: HashMap::from([(
                "a".to_string(),
                vec![task("Buy milk", TaskStatus::NeedsAction)],
            )]),
        };

        let prompt = build_prompt(&provider, DEFAULT_PREAMBLE).await.unwrap();

        assert!(prompt.starts_with(DEFAULT_PREAMBLE));
        assert!(prompt.contains("[Errands]:\n- Buy milk"));
    }

    #[tokio::test]
    async fn test_build_prompt_propagates_provider_error() {
        let provider = FixedTasks {
            lists: vec![list("missing", "Ghost")],
            tasks: HashMap::new(),
        };

        let err = build_prompt(&provider, "Plan").await.unwrap_err();

        assert!(matches!(err, TaskProviderError::Request(_)));
    }
}
