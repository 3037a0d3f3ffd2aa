use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::oneshot;
use trailog::{
    Clause, Engine, EngineConfig, EngineError, FactSetId, FnPrimitive, LeafCall, LeafPoll,
    Outcome, Primitive, Step, Teardown, Term, Value,
};

fn member(engine: &mut Engine) -> FactSetId {
    let x = engine.name("x");
    let t = engine.name("t");
    let goals = engine.goals_mut();
    let member = goals.declare_facts("member");
    let recurse = goals.call(member, [x.clone(), t.clone()]);
    goals
        .define_facts(
            member,
            vec![
                Clause::fact([x.clone(), Term::array_rest([x.clone()], Term::Wild)]),
                Clause::rule([x, Term::array_rest([Term::Wild], t)], recurse),
            ],
        )
        .unwrap();
    member
}

/// `append([], ys, ys)` and `append([h, ...t], ys, [h, ...r]) :- append(t, ys, r)`.
fn append(engine: &mut Engine) -> FactSetId {
    let h = engine.name("h");
    let t = engine.name("t");
    let ys = engine.name("ys");
    let r = engine.name("r");
    let goals = engine.goals_mut();
    let append = goals.declare_facts("append");
    let recurse = goals.call(append, [t.clone(), ys.clone(), r.clone()]);
    goals
        .define_facts(
            append,
            vec![
                Clause::fact([Term::array([]), ys.clone(), ys.clone()]),
                Clause::rule(
                    [
                        Term::array_rest([h.clone()], t),
                        ys,
                        Term::array_rest([h], r),
                    ],
                    recurse,
                ),
            ],
        )
        .unwrap();
    append
}

fn ints(values: impl IntoIterator<Item = i64>) -> Term {
    Term::array(values.into_iter().map(Term::Int))
}

/// Unifies its first argument with whatever arrives on `rx`, once.
fn awaiting(rx: oneshot::Receiver<i64>) -> Arc<dyn Primitive> {
    let slot = Mutex::new(Some(rx));
    Arc::new(FnPrimitive::new("awaiting", move |call: &LeafCall<'_>| {
        let target = call.args()[0].clone();
        let rx = slot.lock().ok().and_then(|mut rx| rx.take());
        match rx {
            Some(rx) => LeafPoll::Pending(
                async move {
                    match rx.await {
                        Ok(n) => Outcome::unify(target, Term::Int(n)),
                        Err(_) => Outcome::Fail,
                    }
                }
                .boxed(),
            ),
            None => LeafPoll::Ready(Outcome::Fail),
        }
    }))
}

// ========== SYNCHRONOUS ==========

#[test]
fn member_in_order() {
    let mut engine = Engine::new();
    let member = member(&mut engine);
    let x = engine.name("x");
    let goal = engine.goals_mut().call(member, [x, ints([7, 8, 9])]);
    let scope = engine.scope();

    let mut query = engine.ask(goal, scope).unwrap();
    let mut seen = Vec::new();
    while query.found() {
        seen.push(query.value("x").unwrap());
        query.next().unwrap();
    }
    assert_eq!(seen, vec![Value::Int(7), Value::Int(8), Value::Int(9)]);
    assert!(query.is_exhausted());
}

#[test]
fn array_rest_captures_the_tail() {
    let mut engine = Engine::new();
    let x = engine.name("x");
    let y = engine.name("y");
    let rest = engine.name("rest");
    let goal = engine
        .goals_mut()
        .unify(ints([1, 2, 3, 4]), Term::array_rest([x, y], rest));
    let scope = engine.scope();

    let answer = engine.demand(goal, scope, &["x", "y", "rest"]).unwrap();
    assert_eq!(
        answer,
        vec![
            Value::Int(1),
            Value::Int(2),
            Value::Array(vec![Value::Int(3), Value::Int(4)]),
        ]
    );
}

#[test]
fn records_bind_by_key() {
    let mut engine = Engine::new();
    let name = engine.sym("name");
    let tags = engine.sym("tags");
    let who = engine.name("who");
    let first = engine.name("first");
    let pattern = Term::record([
        (name, who),
        (tags, Term::array_rest([first], Term::Wild)),
    ]);
    let value = Term::record([
        (tags, Term::array([Term::str("x"), Term::str("y")])),
        (name, Term::str("ada")),
    ]);
    let goal = engine.goals_mut().unify(pattern, value);
    let scope = engine.scope();

    let answer = engine.demand(goal, scope, &["who", "first"]).unwrap();
    assert_eq!(answer, vec![Value::from("ada"), Value::from("x")]);
}

#[test]
fn first_commits_with_cut() {
    let mut engine = Engine::new();
    let member = member(&mut engine);
    let x = engine.name("x");
    let xs = engine.name("xs");
    let goals = engine.goals_mut();
    let pick = goals.call(member, [x.clone(), xs.clone()]);
    let commit = goals.cut();
    let body = goals.seq([pick, commit]);
    let first = goals.facts("first", vec![Clause::rule([x.clone(), xs], body)]);
    let goal = goals.call(first, [x, ints([4, 5, 6])]);
    let scope = engine.scope();

    let found = engine.solutions(goal, scope, &["x"]).unwrap();
    assert_eq!(found, vec![vec![Value::Int(4)]]);
}

#[test]
fn deep_recursion_does_not_grow_the_stack() {
    let mut engine = Engine::new();
    let member = member(&mut engine);
    let x = engine.name("x");
    let goals = engine.goals_mut();
    let pick = goals.call(member, [x.clone(), ints(0..2_000)]);
    let last = goals.unify(x, Term::Int(1_999));
    let goal = goals.seq([pick, last]);
    let scope = engine.scope();

    let found = engine.solutions(goal, scope, &["x"]).unwrap();
    assert_eq!(found, vec![vec![Value::Int(1_999)]]);
    assert_eq!(engine.live_frames(), 0);
}

#[test]
fn append_time_grows_linearly_with_the_list() {
    let elapsed = |len: i64| {
        let mut engine = Engine::new();
        let append = append(&mut engine);
        let out = engine.name("out");
        let goal = engine
            .goals_mut()
            .call(append, [ints(0..len), ints([-1]), out]);
        let scope = engine.scope();
        let started = Instant::now();
        let mut query = engine.query(goal, scope);
        assert!(query.next().unwrap());
        drop(query);
        started.elapsed()
    };
    elapsed(5_000);
    let small = elapsed(20_000);
    let large = elapsed(80_000);
    // Four times the input; copying the remaining list at every step would be sixteen.
    assert!(
        large < small * 12 + Duration::from_millis(100),
        "20k took {:?}, 80k took {:?}",
        small,
        large
    );
}

#[test]
fn long_append_result_reads_back() {
    let mut engine = Engine::new();
    let append = append(&mut engine);
    let out = engine.name("out");
    let goal = engine
        .goals_mut()
        .call(append, [ints(0..20_000), ints([20_000]), out]);
    let scope = engine.scope();

    let answer = engine.demand(goal, scope, &["out"]).unwrap();
    match &answer[..] {
        [Value::Array(items)] => {
            assert_eq!(items.len(), 20_001);
            assert_eq!(items[0], Value::Int(0));
            assert_eq!(items[20_000], Value::Int(20_000));
        }
        other => panic!("expected one closed array, got {:?}", other),
    }
}

#[test]
fn pooled_and_unpooled_agree() {
    let run = |config: EngineConfig| {
        let mut engine = Engine::with_config(config);
        let member = member(&mut engine);
        let x = engine.name("x");
        let y = engine.name("y");
        let goals = engine.goals_mut();
        let left = goals.call(member, [x.clone(), ints([1, 2, 3])]);
        let right = goals.call(member, [y.clone(), ints([1, 2, 3])]);
        let same = goals.unify(x, y);
        let goal = goals.seq([left, right, same]);
        let scope = engine.scope();
        let found = engine.solutions(goal, scope, &["x", "y"]).unwrap();
        (found, engine.stats().solutions)
    };
    let pooled = run(EngineConfig::default());
    let unpooled = run(EngineConfig::unpooled());
    assert_eq!(pooled, unpooled);
    assert_eq!(pooled.0.len(), 3);
}

#[test]
fn root_scope_is_released_after_query() {
    let mut engine = Engine::new();
    let member = member(&mut engine);
    let x = engine.name("x");
    let goal = engine.goals_mut().call(member, [x, ints([1, 2])]);
    let scope = engine.scope();
    {
        let mut query = engine.ask(goal, scope).unwrap();
        assert!(query.next().unwrap());
    }
    assert_eq!(engine.heap().scope_refs(scope), 1);
    assert_eq!(engine.heap().trail().len(), 0);
}

#[test]
fn suspended_query_reports_through_next() {
    let (_tx, rx) = oneshot::channel();
    let mut engine = Engine::new();
    let x = engine.name("x");
    let goal = engine.goals_mut().leaf(awaiting(rx), [x]);
    let scope = engine.scope();
    let mut query = engine.query(goal, scope);
    assert_eq!(query.next(), Err(EngineError::Suspended));
    assert!(query.is_suspended());
}

#[test]
fn engines_move_between_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<Engine>();

    let handle = std::thread::spawn(|| {
        let mut engine = Engine::new();
        let member = member(&mut engine);
        let x = engine.name("x");
        let goal = engine.goals_mut().call(member, [x, ints([1, 2])]);
        let scope = engine.scope();
        engine.solutions(goal, scope, &["x"]).unwrap().len()
    });
    assert_eq!(handle.join().unwrap(), 2);
}

// ========== ASYNCHRONOUS ==========

#[tokio::test]
async fn pending_leaf_resumes_after_send() {
    let (tx, rx) = oneshot::channel();
    let mut engine = Engine::new();
    let x = engine.name("x");
    let y = engine.name("y");
    let goals = engine.goals_mut();
    let wait = goals.leaf(awaiting(rx), [x]);
    let y1 = goals.unify(y.clone(), Term::Int(1));
    let y2 = goals.unify(y, Term::Int(2));
    let pick = goals.choice([y1, y2]);
    let goal = goals.seq([wait, pick]);
    let scope = engine.scope();

    let mut query = engine.query(goal, scope);
    assert_eq!(query.resume().unwrap(), Step::Pending);
    tx.send(5).unwrap();

    let mut rows = Vec::new();
    while query.next_solution().await.unwrap() {
        rows.push((query.value("x").unwrap(), query.value("y").unwrap()));
    }
    assert_eq!(
        rows,
        vec![
            (Value::Int(5), Value::Int(1)),
            (Value::Int(5), Value::Int(2)),
        ]
    );
}

#[tokio::test]
async fn leaf_waits_for_a_spawned_sender() {
    let (tx, rx) = oneshot::channel();
    let mut engine = Engine::new();
    let x = engine.name("x");
    let goal = engine.goals_mut().leaf(awaiting(rx), [x]);
    let scope = engine.scope();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _ = tx.send(7);
    });
    let mut query = engine.query(goal, scope);
    assert!(query.next_solution().await.unwrap());
    assert_eq!(query.value("x").unwrap(), Value::Int(7));
    assert!(!query.next_solution().await.unwrap());
}

#[tokio::test]
async fn dropped_sender_fails_the_leaf() {
    let (tx, rx) = oneshot::channel::<i64>();
    let mut engine = Engine::new();
    let x = engine.name("x");
    let goal = engine.goals_mut().leaf(awaiting(rx), [x]);
    let scope = engine.scope();

    let mut query = engine.query(goal, scope);
    assert_eq!(query.resume().unwrap(), Step::Pending);
    drop(tx);
    assert!(!query.next_solution().await.unwrap());
    assert!(query.is_exhausted());
}

#[tokio::test]
async fn cancel_while_pending_is_deferred_until_the_leaf_resolves() {
    let (tx, rx) = oneshot::channel();
    let mut engine = Engine::new();
    let x = engine.name("x");
    let z = engine.name("z");
    let goals = engine.goals_mut();
    let bind = goals.unify(z.clone(), Term::Int(1));
    let wait = goals.leaf(awaiting(rx), [x.clone()]);
    let goal = goals.seq([bind, wait]);
    let scope = engine.scope();

    {
        let mut query = engine.query(goal, scope);
        assert_eq!(query.resume().unwrap(), Step::Pending);
        assert_eq!(query.value("z").unwrap(), Value::Int(1));
        assert_eq!(query.cancel(), Teardown::Deferred);

        tx.send(3).unwrap();
        assert!(!query.next_solution().await.unwrap());
        assert!(query.is_exhausted());
        assert!(query.value("z").unwrap().is_null());
        assert!(query.value("x").unwrap().is_null());
    }
    assert_eq!(engine.live_frames(), 0);
    assert!(engine.read(&z, scope).unwrap().is_null());
    assert!(engine.read(&x, scope).unwrap().is_null());
}
