//! Cascading saves through owned children

use std::future::Future;

use tracing::debug;

use crate::error::Result;
use crate::lifecycle::{SaveAction, SaveScope};

/// Saves every child in iteration order as a [`SaveScope::Nested`] save.
///
/// Stops at the first failure. Children saved before the failure stay staged
/// in the pending unit of work. Returns the number of children saved.
pub async fn cascade_children<'a, C, I, F, Fut>(children: I, mut save_child: F) -> Result<usize>
where
    C: 'a,
    I: IntoIterator<Item = &'a mut C>,
    F: FnMut(&'a mut C, SaveScope) -> Fut,
    Fut: Future<Output = Result<SaveAction>>,
{
    let mut saved = 0;

    for child in children {
        let action = save_child(child, SaveScope::Nested).await?;
        saved += 1;
        debug!(index = saved - 1, action = %action, "Cascaded child save");
    }

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_one_nested_call_per_child() {
        let mut children = vec![1, 2, 3, 4, 5, 6, 7];
        let calls = Mutex::new(Vec::new());

        let saved = cascade_children(children.iter_mut(), |child, scope| {
            calls.lock().unwrap().push((*child, scope));
            async { Ok(SaveAction::Update) }
        })
        .await
        .unwrap();

        assert_eq!(saved, 7);
        let calls = calls.into_inner().unwrap();
        assert_eq!(calls.len(), 7);
        assert!(calls.iter().all(|(_, scope)| *scope == SaveScope::Nested));
        let order: Vec<i32> = calls.iter().map(|(child, _)| *child).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let mut children = vec![1, 2, 3, 4];
        let visited = Mutex::new(Vec::new());

        let result = cascade_children(children.iter_mut(), |child, _| {
            visited.lock().unwrap().push(*child);
            let fail = *child == 2;
            async move {
                if fail {
                    Err(PersistenceError::Cancelled)
                } else {
                    Ok(SaveAction::Create)
                }
            }
        })
        .await;

        assert!(matches!(result, Err(PersistenceError::Cancelled)));
        assert_eq!(visited.into_inner().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_children_can_be_mutated() {
        let mut children = vec![0, 0, 0];

        cascade_children(children.iter_mut(), |child, _| {
            *child += 1;
            async { Ok(SaveAction::Update) }
        })
        .await
        .unwrap();

        assert_eq!(children, vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_no_children() {
        let mut children: Vec<u8> = Vec::new();
        let saved = cascade_children(children.iter_mut(), |_, _| async {
            Ok(SaveAction::Update)
        })
        .await
        .unwrap();
        assert_eq!(saved, 0);
    }
}
