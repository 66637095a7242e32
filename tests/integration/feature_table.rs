#![allow(missing_docs)]

use netpack::geom::{BBox, Coord, Geometry};
use netpack::storage::{Container, GPKG_APPLICATION_ID, GPKG_USER_VERSION};
use netpack::{AttrValue, Attrs, GraphError, Result, StoreOptions};
use tempfile::tempdir;

fn line(coords: &[(f64, f64)]) -> Geometry {
    Geometry::LineString(coords.iter().copied().map(Coord::from).collect())
}

#[test]
fn new_file_is_a_geopackage() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("layers.gpkg");
    let container = Container::open(&path, StoreOptions::default())?;
    let conn = container.connection();
    let app_id: i32 = conn.query_row("PRAGMA application_id", [], |r| r.get(0))?;
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    assert_eq!(app_id, GPKG_APPLICATION_ID);
    assert_eq!(version, GPKG_USER_VERSION);

    let srids: Vec<i32> = conn
        .prepare("SELECT srs_id FROM gpkg_spatial_ref_sys ORDER BY srs_id")?
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    assert_eq!(srids, vec![-1, 0, 4326]);
    Ok(())
}

#[test]
fn rows_survive_reopen_with_geometry() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("roads.gpkg");
    let geom = line(&[(13.4050, 52.5200), (13.4060, 52.5210), (13.4075, 52.5208)]);
    {
        let container = Container::open(&path, StoreOptions::default())?;
        let table = container.create_feature_table("roads", "LINESTRING", 4326)?;
        table.write(
            vec![Attrs::new()
                .with("name", "Unter den Linden")
                .with("lanes", 4)
                .with("maxspeed", 50.0)
                .with_geom(geom.clone())],
            10,
        )?;
    }

    let container = Container::open(&path, StoreOptions::read_only())?;
    let table = container.feature_table("roads")?;
    let rows = table.scan()?.collect_vec()?;
    assert_eq!(rows.len(), 1);
    let attrs = &rows[0].attrs;
    assert_eq!(attrs.get("name"), Some(&AttrValue::Text("Unter den Linden".into())));
    assert_eq!(attrs.get("lanes"), Some(&AttrValue::Integer(4)));
    assert_eq!(attrs.get("maxspeed"), Some(&AttrValue::Real(50.0)));
    assert_eq!(attrs.geom(), Some(&geom));

    let count: i64 = container.connection().query_row(
        "SELECT feature_count FROM gpkg_ogr_contents WHERE table_name = 'roads'",
        [],
        |r| r.get(0),
    )?;
    assert_eq!(count, 1);
    Ok(())
}

#[test]
fn first_seen_type_decides_the_column() -> Result<()> {
    let container = Container::open_in_memory(StoreOptions::default())?;
    let table = container.create_feature_table("mixed", "POINT", 4326)?;
    table.write(
        vec![
            Attrs::new().with("ref", 7),
            Attrs::new().with("ref", "B 96").with("note", "later column"),
        ],
        1,
    )?;
    let columns = table.columns()?;
    let ref_column = columns.iter().find(|c| c.name == "ref").map(|c| c.declared.clone());
    assert_eq!(ref_column.as_deref(), Some("INTEGER"));
    assert!(columns.iter().any(|c| c.name == "note"));

    let rows = table.scan()?.collect_vec()?;
    assert!(!rows[0].attrs.contains_key("note"));
    Ok(())
}

#[test]
fn unsupported_values_are_rejected_before_writing() -> Result<()> {
    let container = Container::open_in_memory(StoreOptions::default())?;
    let table = container.create_feature_table("bad", "POINT", 4326)?;
    let object = serde_json::json!({"tags": ["a", "b"]});
    let err = Attrs::from_json(object.as_object().unwrap()).unwrap_err();
    assert!(matches!(err, GraphError::UnsupportedAttributeType { ref key, .. } if key == "tags"));
    assert!(table.is_empty()?);
    Ok(())
}

#[test]
fn index_tracks_updates_and_deletes() -> Result<()> {
    let container = Container::open_in_memory(StoreOptions::default())?;
    let table = container.create_feature_table("stops", "POINT", 4326)?;
    table.add_spatial_index()?;
    table.write(
        vec![
            Attrs::new().with("name", "west").with_geom(Geometry::Point(Coord::new(0.0, 0.0))),
            Attrs::new().with("name", "east").with_geom(Geometry::Point(Coord::new(10.0, 0.0))),
        ],
        10,
    )?;
    let near_west = BBox::new(-1.0, -1.0, 1.0, 1.0);
    assert_eq!(table.intersects(&near_west)?.len(), 1);

    let east = table
        .scan()?
        .collect_vec()?
        .into_iter()
        .find(|f| f.attrs.get("name") == Some(&AttrValue::Text("east".into())))
        .map(|f| f.fid);
    let east = east.ok_or_else(|| GraphError::InvalidArgument("east missing".into()))?;
    table.update(east, &Attrs::new().with_geom(Geometry::Point(Coord::new(0.5, 0.5))))?;
    assert_eq!(table.intersects(&near_west)?.len(), 2);

    table.delete([east])?;
    assert_eq!(table.intersects(&near_west)?.len(), 1);
    assert_eq!(table.len()?, 1);
    Ok(())
}

#[test]
fn proximity_is_measured_on_the_ground() -> Result<()> {
    let container = Container::open_in_memory(StoreOptions::default())?;
    let table = container.create_feature_table("ways", "LINESTRING", 4326)?;
    table.add_spatial_index()?;
    // Two parallel east-west segments, roughly 111 m and 1.1 km north of the origin.
    table.write(
        vec![
            Attrs::new().with("name", "near").with_geom(line(&[(-0.01, 0.001), (0.01, 0.001)])),
            Attrs::new().with("name", "far").with_geom(line(&[(-0.01, 0.01), (0.01, 0.01)])),
        ],
        10,
    )?;
    let hits = table.within_distance(Coord::new(0.0, 0.0), 500.0, true)?;
    assert_eq!(hits.len(), 1);
    assert!((hits[0].1 - 111.2).abs() < 1.0, "distance {}", hits[0].1);

    let hits = table.within_distance(Coord::new(0.0, 0.0), 2_000.0, true)?;
    let names: Vec<_> = hits
        .iter()
        .filter_map(|(f, _)| f.attrs.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    assert_eq!(names, vec!["near", "far"]);
    Ok(())
}

#[test]
fn spatial_queries_without_index_fail() -> Result<()> {
    let container = Container::open_in_memory(StoreOptions::default())?;
    let table = container.create_feature_table("plain", "POINT", 4326)?;
    let err = table.within_distance(Coord::new(0.0, 0.0), 10.0, false).unwrap_err();
    assert!(matches!(err, GraphError::MissingSpatialIndex { ref table } if table == "plain"));
    Ok(())
}

#[test]
fn read_only_container_rejects_writes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("ro.gpkg");
    Container::open(&path, StoreOptions::default())?.create_feature_table("t", "POINT", 4326)?;
    let container = Container::open(&path, StoreOptions::read_only())?;
    let table = container.feature_table("t")?;
    assert!(matches!(
        table.write(vec![Attrs::new().with("a", 1)], 1),
        Err(GraphError::ImmutableGraph)
    ));
    assert!(matches!(
        container.create_feature_table("u", "POINT", 4326),
        Err(GraphError::ImmutableGraph)
    ));
    Ok(())
}
