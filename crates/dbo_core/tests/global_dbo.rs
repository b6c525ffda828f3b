mod common;

use common::{classes, Class, SCHEMA};
use dbo_core::{crud, Config, Context, Dbo, QueryCondition};

// The global handle is process-wide, so everything touching it lives in one
// test to keep the steps ordered.
#[test]
fn global_handle_is_lazy_and_replaceable() {
    let lazy = dbo_core::global().unwrap();
    assert_eq!(lazy.config().connection_string, ":memory:");
    dbo_core::must_get_session().execute_batch(SCHEMA).unwrap();

    crud::insert(&Class::new(1, "default")).unwrap();
    assert_eq!(crud::count::<Class, _>(&()).unwrap(), 1);

    let replacement = Dbo::new(Config::new().with_max_idle_conns(1)).unwrap();
    replacement.session().unwrap().execute_batch(SCHEMA).unwrap();
    let previous = dbo_core::replace_global(replacement).unwrap();
    assert!(std::sync::Arc::ptr_eq(&previous, &lazy));

    // The replacement starts empty; the old handle still serves its holders.
    assert_eq!(crud::count::<Class, _>(&()).unwrap(), 0);
    assert_eq!(previous.session().unwrap().count::<Class, _>(&()).unwrap(), 1);

    dbo_core::transaction(&Context::background(), |session| {
        session.insert_many(&classes(1..=3))?;
        Ok(())
    })
    .unwrap();

    let total = dbo_core::transaction_result(&Context::background(), |session| {
        session.count::<Class, _>(&())
    })
    .unwrap();
    assert_eq!(total, 3);

    crud::update(&Class::new(2, "renamed")).unwrap();
    crud::save(&Class::new(4, "saved")).unwrap();
    assert_eq!(crud::get::<Class>(2).unwrap().name, "renamed");
    assert!(crud::get::<Class>(99).unwrap_err().is_not_found());

    let (total, page) = crud::page::<Class, _>(
        &QueryCondition::new()
            .order_by("id DESC")
            .paged(dbo_core::Pager::new(1, 2)),
    )
    .unwrap();
    assert_eq!(total, 4);
    assert_eq!(page.iter().map(|c| c.id).collect::<Vec<_>>(), vec![4, 3]);

    assert_eq!(crud::insert_in_batches(&[Class::new(5, "five")], 0).unwrap(), 1);
    assert_eq!(
        crud::query_raw::<Class>("SELECT id, name, grade FROM class WHERE id = 5", &[])
            .unwrap()
            .len(),
        1
    );
    assert_eq!(crud::query::<Class, _>(&()).unwrap().len(), 5);
}
