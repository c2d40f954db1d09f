use taxa_ecs::{EcsError, NamedRegistry, NestedList, PriorityQueue, Registry, RegistryError};

#[test]
fn priority_queue_pops_in_deadline_order() {
    let mut queue = PriorityQueue::new();
    queue.push("a", 3.0);
    queue.push("b", 1.0);
    queue.push("c", 2.0);

    assert_eq!(queue.top_priority().unwrap(), 1.0);
    assert_eq!(queue.pop().unwrap(), ("b", 1.0));
    assert_eq!(queue.pop().unwrap(), ("c", 2.0));
    assert_eq!(queue.pop().unwrap(), ("a", 3.0));
    assert!(queue.is_empty());
}

#[test]
fn priority_queue_orders_arbitrary_pushes() {
    let mut queue = PriorityQueue::new();
    // Deterministic scramble.
    let mut seed = 0x2545_F491u64;
    for i in 0..200u64 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        queue.push(i, (seed >> 33) as f64);
    }

    let mut last = f64::NEG_INFINITY;
    while !queue.is_empty() {
        let (_, priority) = queue.pop().unwrap();
        assert!(priority >= last, "priorities must pop non-decreasing");
        last = priority;
    }
}

#[test]
fn empty_queue_operations_are_fatal() {
    let mut queue: PriorityQueue<u32> = PriorityQueue::new();
    assert!(matches!(queue.pop(), Err(EcsError::Queue(_))));
    assert!(matches!(queue.peek(), Err(EcsError::Queue(_))));
    assert!(matches!(queue.top_priority(), Err(EcsError::Queue(_))));
}

#[test]
fn nested_list_transfers_row_ownership() {
    let mut source: NestedList<u32> = NestedList::new();
    let first = source.push_row(4);
    source.row_mut(first).unwrap().extend([1, 2, 3]);
    source.push_row(0);
    source.row_mut(1).unwrap().push(9);

    let mut target: NestedList<u32> = NestedList::new();
    let landed = source.transfer(first, &mut target).unwrap();

    assert_eq!(target.row(landed).unwrap().as_slice(), &[1, 2, 3]);
    assert_eq!(target.get(landed, 1), Some(&2));
    // Swap-back at the source: the second row now sits first.
    assert_eq!(source.len(), 1);
    assert_eq!(source.row(0).unwrap().as_slice(), &[9]);

    assert!(source.take_row(5).is_err());
}

#[test]
fn registry_interns_values_once() {
    let mut registry: Registry<String> = Registry::new();
    let a = registry.intern("alpha".to_string()).unwrap();
    let b = registry.intern("beta".to_string()).unwrap();
    let a_again = registry.intern("alpha".to_string()).unwrap();

    assert_eq!(a, a_again);
    assert_ne!(a, b);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get(a), Some(&"alpha".to_string()));
    assert_eq!(registry.index_of(&"beta".to_string()), Some(b));
}

#[test]
fn named_registry_requires_a_loader_on_miss() {
    let mut registry: NamedRegistry<u32> = NamedRegistry::new();
    let ten = registry.add("ten", 10).unwrap();
    assert_eq!(registry.get(ten), Some(&10));
    assert_eq!(registry.index_by_name("ten"), Some(ten));
    assert_eq!(registry.name(ten), Some("ten"));

    // Duplicate names are rejected.
    assert!(matches!(
        registry.add("ten", 11),
        Err(EcsError::Registry(RegistryError::DuplicateName { .. }))
    ));

    // A miss without a loader is fatal.
    assert!(matches!(
        registry.get_or_load("eleven"),
        Err(EcsError::Registry(RegistryError::MissingEntry { .. }))
    ));

    // With a loader, misses construct fresh entries exactly once.
    registry.set_loader(Box::new(|name| Ok(name.len() as u32)));
    let eleven = registry.get_or_load("eleven").unwrap();
    assert_eq!(registry.get(eleven), Some(&6));
    assert_eq!(registry.get_or_load("eleven").unwrap(), eleven);
}
