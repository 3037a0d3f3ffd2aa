use crate::cell::Heap;
use crate::engine::{Engine, EngineConfig};
use crate::goal::{Clause, FactSetId};
use crate::term::Term;

pub(crate) fn setup() -> Engine {
    Engine::new()
}

pub(crate) fn setup_unpooled() -> Engine {
    Engine::with_config(EngineConfig::unpooled())
}

pub(crate) fn setup_heap() -> Heap {
    Heap::new(true, 16, 16)
}

pub(crate) fn ints(values: &[i64]) -> Term {
    Term::array(values.iter().map(|&n| Term::Int(n)))
}

/// `member(x, [x, ..._])` and `member(x, [_, ...t]) :- member(x, t)`.
pub(crate) fn define_member(engine: &mut Engine) -> FactSetId {
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
        .expect("member is defined once");
    member
}
